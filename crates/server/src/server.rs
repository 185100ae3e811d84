use axum::{
    Router,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use axum_extra::{
    TypedHeader,
    headers::{Error as AxumError, Header},
};

use std::sync::Arc;

use crate::{admin, checklist, resources, summaries, transactions, user};
use engine::{Engine, Principal, Role};

static PRINCIPAL_ID_HEADER: HeaderName = HeaderName::from_static("x-principal-id");
static PRINCIPAL_ROLE_HEADER: HeaderName = HeaderName::from_static("x-principal-role");

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
}

/// `TypedHeader` carrying the authenticated uid.
///
/// Authentication happens upstream; the gateway forwards the verified uid in
/// "x-principal-id".
#[derive(Debug)]
struct PrincipalIdHeader(String);

impl Header for PrincipalIdHeader {
    fn name() -> &'static HeaderName {
        &PRINCIPAL_ID_HEADER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, AxumError>
    where
        Self: Sized,
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(AxumError::invalid)?;
        let Ok(value) = value.to_str() else {
            return Err(AxumError::invalid());
        };
        let value = value.trim();
        if value.is_empty() {
            return Err(AxumError::invalid());
        }

        Ok(PrincipalIdHeader(value.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        match HeaderValue::from_str(&self.0) {
            Ok(value) => values.extend(std::iter::once(value)),
            Err(_) => tracing::error!("failed to encode x-principal-id header"),
        }
    }
}

/// `TypedHeader` for the caller role, `user` when absent.
#[derive(Debug)]
struct PrincipalRoleHeader(Role);

impl Header for PrincipalRoleHeader {
    fn name() -> &'static HeaderName {
        &PRINCIPAL_ROLE_HEADER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, AxumError>
    where
        Self: Sized,
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(AxumError::invalid)?;
        let Ok(value) = value.to_str() else {
            return Err(AxumError::invalid());
        };
        let Ok(role) = Role::try_from(value) else {
            return Err(AxumError::invalid());
        };

        Ok(PrincipalRoleHeader(role))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let value = match self.0 {
            Role::User => HeaderValue::from_static("user"),
            Role::Admin => HeaderValue::from_static("admin"),
        };
        values.extend(std::iter::once(value));
    }
}

async fn auth(
    id_header: Option<TypedHeader<PrincipalIdHeader>>,
    role_header: Option<TypedHeader<PrincipalRoleHeader>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(TypedHeader(PrincipalIdHeader(uid))) = id_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let role = role_header.map_or(Role::User, |TypedHeader(header)| header.0);

    request.extensions_mut().insert(Principal { uid, role });
    Ok(next.run(request).await)
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/users/register", post(user::register))
        .route(
            "/resources",
            get(resources::list).post(resources::create),
        )
        .route(
            "/resources/{id}",
            get(resources::get)
                .patch(resources::update)
                .delete(resources::delete),
        )
        .route("/resources/{id}/periods", get(resources::periods))
        .route("/budgets/{id}/duration", post(resources::duration))
        .route("/periods/{id}", get(resources::period))
        .route("/periods/{id}/allocation", put(resources::allocation))
        .route("/periods/{id}/checklist", post(checklist::add))
        .route(
            "/periods/{id}/checklist/{item_id}",
            axum::routing::patch(checklist::update).delete(checklist::delete),
        )
        .route(
            "/periods/{id}/checklist/{item_id}/toggle",
            post(checklist::toggle),
        )
        .route("/transactions", post(transactions::create))
        .route(
            "/transactions/{id}",
            get(transactions::get)
                .patch(transactions::update)
                .delete(transactions::delete),
        )
        .route(
            "/summaries/{period_type}/{source_period_id}",
            get(summaries::get),
        )
        .route(
            "/summaries/{period_type}/{source_period_id}/recalculate",
            post(summaries::recalculate),
        )
        .route("/admin/calendar", post(admin::calendar))
        .route("/admin/backfill", post(admin::backfill))
        .route("/admin/extend", post(admin::extend))
        .route("/admin/totals", post(admin::totals))
        .route_layer(middleware::from_fn(auth))
        .with_state(state)
}

pub async fn run(engine: Arc<Engine>, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    run_with_listener(engine, listener).await
}

pub async fn run_with_listener(
    engine: Arc<Engine>,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(ServerState { engine })).await
}
