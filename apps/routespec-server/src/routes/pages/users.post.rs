use std::sync::Arc;
use std::time::Duration;

use routespec::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::{User, UserStatus};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

pub fn route(registry: &mut Registry) -> anyhow::Result<Pipeline> {
    let pipeline = define_meta(
        registry,
        RouteMeta {
            operation_id: Some("createUser".into()),
            title: Some("Create user".into()),
            description: Some("Responses are wrapped in a success envelope.".into()),
            body: Some(schema::<NewUser>()?),
            response: ResponseSchemas::by_status([(201, schema::<User>()?)]),
            middleware: vec![Arc::new(RateLimit::new(10, Duration::from_secs(60)))],
            transform_response: Some(envelope()),
            ..RouteMeta::default()
        },
    )?
    .define_event_handler(handler_fn(create_user));
    Ok(pipeline)
}

async fn create_user(input: HandlerInput) -> Result<HandlerOutput, HttpError> {
    let new_user: NewUser = input.body_as()?;
    if new_user.name.trim().is_empty() {
        return Err(HttpError::bad_request("name must not be blank"));
    }
    HandlerOutput::created(User {
        id: 26,
        name: new_user.name,
        email: new_user.email,
        status: UserStatus::Active,
    })
}
