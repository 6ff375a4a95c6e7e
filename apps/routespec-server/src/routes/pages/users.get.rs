use std::time::Duration;

use routespec::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::User;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListQuery {
    /// Maximum number of users returned.
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UserList {
    pub users: Vec<User>,
    pub total: u32,
}

const TOTAL: u32 = 25;

pub fn route(registry: &mut Registry) -> anyhow::Result<Pipeline> {
    let pipeline = define_meta(
        registry,
        RouteMeta {
            operation_id: Some("listUsers".into()),
            summary: Some("List users".into()),
            query: Some(schema::<ListQuery>()?),
            response: ResponseSchemas::single(schema::<UserList>()?),
            ..RouteMeta::default()
        },
    )?
    .define_cached_event_handler(
        handler_fn(list_users),
        CacheOptions::max_age(Duration::from_secs(30)),
    );
    Ok(pipeline)
}

async fn list_users(input: HandlerInput) -> Result<HandlerOutput, HttpError> {
    let query: ListQuery = input.query_as()?;
    let limit = query.limit.unwrap_or(10).min(TOTAL);
    HandlerOutput::ok(UserList {
        users: (1..=u64::from(limit)).map(User::sample).collect(),
        total: TOTAL,
    })
}
