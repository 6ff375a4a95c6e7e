use routespec::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HomeQuery {
    /// Who to greet.
    pub name: Option<String>,
}

pub fn route(registry: &mut Registry) -> anyhow::Result<Pipeline> {
    let pipeline = define_meta(
        registry,
        RouteMeta {
            title: Some("Home".into()),
            summary: Some("Welcome to the playground".into()),
            description: Some("Answers with an empty body.".into()),
            query: Some(schema::<HomeQuery>()?),
            ..RouteMeta::default()
        },
    )?
    .define_event_handler(handler_fn(home));
    Ok(pipeline)
}

async fn home(input: HandlerInput) -> Result<HandlerOutput, HttpError> {
    let query: HomeQuery = input.query_as()?;
    tracing::debug!(name = ?query.name, "home visited");
    Ok(HandlerOutput::with_status(200, None))
}
