use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use routespec::prelude::*;
use routespec::{InputSource, PipelineError, Stage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Message {
    message: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct PageParams {
    page: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct NewUser {
    name: String,
    age: u32,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct Paging {
    page: u32,
}

async fn show_page(input: HandlerInput) -> Result<HandlerOutput, HttpError> {
    let params: PageParams = input.path_as()?;
    HandlerOutput::ok(Message {
        message: params.page,
    })
}

#[tokio::test]
async fn page_scenario_echoes_the_path_parameter() {
    let mut registry = Registry::new();
    let pipeline = define_meta(
        &mut registry,
        RouteMeta {
            path: Some(schema::<PageParams>().unwrap()),
            response: ResponseSchemas::single(schema::<Message>().unwrap()),
            __path: "/pages/{page}",
            __method: "GET",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(show_page));

    let resp = pipeline
        .execute(pipeline.request("/pages/about").path_param("page", "about"))
        .await;

    assert_eq!(resp.stage, Stage::Completed);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, Some(json!({ "message": "about" })));
}

#[tokio::test]
async fn invalid_body_never_reaches_the_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let mut registry = Registry::new();
    let pipeline = define_meta(
        &mut registry,
        RouteMeta {
            body: Some(schema::<NewUser>().unwrap()),
            response: ResponseSchemas::by_status([(201, schema::<NewUser>().unwrap())]),
            __path: "/users",
            __method: "POST",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(move |input: HandlerInput| {
        seen.fetch_add(1, Ordering::SeqCst);
        async move { HandlerOutput::created(input.body) }
    }));

    let resp = pipeline
        .execute(pipeline.request("/users").body(json!({ "name": "Ada", "age": "old" })))
        .await;

    assert_eq!(resp.status, 400);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let body = resp.body.unwrap();
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["statusMessage"], "Bad Request");
    assert_eq!(body["data"]["source"], "body");
    assert_eq!(body["data"]["errors"][0]["path"], "/age");

    let ok = pipeline
        .execute(pipeline.request("/users").body(json!({ "name": "Ada", "age": 36 })))
        .await;
    assert_eq!(ok.status, 201);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_body_is_validated_as_null() {
    let mut registry = Registry::new();
    let pipeline = define_meta(
        &mut registry,
        RouteMeta {
            body: Some(schema::<NewUser>().unwrap()),
            __path: "/users",
            __method: "PUT",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(|_| async { Ok(HandlerOutput::no_content()) }));

    let resp = pipeline.execute(pipeline.request("/users")).await;
    assert_eq!(resp.status, 400);
    assert!(matches!(
        resp.error,
        Some(PipelineError::RequestValidation {
            location: InputSource::Body,
            ..
        })
    ));
}

#[tokio::test]
async fn invalid_response_is_replaced_by_a_500() {
    let mut registry = Registry::new();
    let pipeline = define_meta(
        &mut registry,
        RouteMeta {
            response: ResponseSchemas::single(schema::<Message>().unwrap()),
            __path: "/broken",
            __method: "GET",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(|_| async {
        HandlerOutput::ok(json!({ "message": 42, "internal": "secret" }))
    }));

    let resp = pipeline.execute(pipeline.request("/broken")).await;
    assert_eq!(resp.status, 500);
    assert_eq!(
        resp.body,
        Some(json!({ "statusCode": 500, "statusMessage": "Internal Server Error" }))
    );
    assert!(matches!(
        resp.error,
        Some(PipelineError::ResponseValidation { status: 200, .. })
    ));
}

#[tokio::test]
async fn body_without_a_declared_response_is_unregistered() {
    let mut registry = Registry::new();
    let pipeline = define_meta(
        &mut registry,
        RouteMeta {
            __path: "/status",
            __method: "GET",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(|_| async { HandlerOutput::ok(json!({ "ok": true })) }));

    let resp = pipeline.execute(pipeline.request("/status")).await;
    assert_eq!(resp.status, 500);
    assert!(matches!(
        resp.error,
        Some(PipelineError::UnregisteredResponseSchema { status: 200 })
    ));
    assert_eq!(
        resp.body,
        Some(json!({ "statusCode": 500, "statusMessage": "Internal Server Error" }))
    );
}

#[tokio::test]
async fn query_is_validated_before_path() {
    let mut registry = Registry::new();
    let pipeline = define_meta(
        &mut registry,
        RouteMeta {
            query: Some(schema::<Paging>().unwrap()),
            path: Some(
                json_schema(json!({
                    "type": "object",
                    "properties": { "id": { "type": "integer" } },
                    "required": ["id"]
                }))
                .unwrap(),
            ),
            __path: "/items/{id}",
            __method: "GET",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(|_| async { Ok(HandlerOutput::no_content()) }));

    let resp = pipeline
        .execute(
            pipeline
                .request("/items/x")
                .path_param("id", "x")
                .query_param("page", "first"),
        )
        .await;
    assert_eq!(resp.body.unwrap()["data"]["source"], "query");

    let resp = pipeline
        .execute(
            pipeline
                .request("/items/x")
                .path_param("id", "x")
                .query_param("page", "2"),
        )
        .await;
    assert_eq!(resp.body.unwrap()["data"]["source"], "path");

    let resp = pipeline
        .execute(
            pipeline
                .request("/items/7")
                .path_param("id", "7")
                .query_param("page", "2"),
        )
        .await;
    assert_eq!(resp.status, 204);
}

#[tokio::test]
async fn middleware_rejection_keeps_its_status_and_data() {
    let mut registry = Registry::new();
    let pipeline = define_meta(
        &mut registry,
        RouteMeta {
            middleware: vec![Arc::new(RateLimit::new(1, Duration::from_secs(60)))],
            __path: "/limited",
            __method: "GET",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(|_| async { Ok(HandlerOutput::no_content()) }));

    let first = pipeline.execute(pipeline.request("/limited").client("1.2.3.4")).await;
    assert_eq!(first.status, 204);

    let second = pipeline.execute(pipeline.request("/limited").client("1.2.3.4")).await;
    assert_eq!(second.status, 429);
    let body = second.body.unwrap();
    assert_eq!(body["statusMessage"], "Too Many Requests");
    assert!(body["data"]["retryAfter"].is_u64());

    let unauthorized = define_meta(
        &mut registry,
        RouteMeta {
            middleware: vec![Arc::new(ApiKeyAuth::new(["k1"]))],
            __path: "/private",
            __method: "GET",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(|_| async { Ok(HandlerOutput::no_content()) }));
    let resp = unauthorized.execute(unauthorized.request("/private")).await;
    assert_eq!(resp.status, 401);
    let resp = unauthorized
        .execute(unauthorized.request("/private").header("x-api-key", "k1"))
        .await;
    assert_eq!(resp.status, 204);
}

#[tokio::test]
async fn transforms_apply_after_validation() {
    let mut registry = Registry::new();
    let pipeline = define_meta(
        &mut registry,
        RouteMeta {
            response: ResponseSchemas::single(schema::<Message>().unwrap()),
            transform_response: Some(envelope()),
            __path: "/wrapped",
            __method: "GET",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(|_| async {
        HandlerOutput::ok(json!({ "message": "hi" }))
    }));

    let resp = pipeline.execute(pipeline.request("/wrapped")).await;
    assert_eq!(
        resp.body,
        Some(json!({ "success": true, "statusCode": 200, "data": { "message": "hi" } }))
    );
}

#[tokio::test]
async fn handler_http_errors_pass_through() {
    let mut registry = Registry::new();
    let pipeline = define_meta(
        &mut registry,
        RouteMeta {
            __path: "/things/{id}",
            __method: "DELETE",
            ..RouteMeta::default()
        },
    )
    .unwrap()
    .define_event_handler(handler_fn(|_| async {
        Err(HttpError::not_found("No such thing").with_data(json!({ "id": "7" })))
    }));

    let resp = pipeline
        .execute(pipeline.request("/things/7").path_param("id", "7"))
        .await;
    assert_eq!(resp.status, 404);
    assert_eq!(
        resp.body,
        Some(json!({ "statusCode": 404, "statusMessage": "No such thing", "data": { "id": "7" } }))
    );
}
