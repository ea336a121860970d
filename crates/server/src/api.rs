//! JSON API shared plumbing: application state, per-request context and the
//! error body every handler returns.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Json, Query,
    },
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use freightdesk_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use freightdesk_core::domain::actor::Actor;
use freightdesk_core::errors::{ApplicationError, DomainError, InterfaceError};
use freightdesk_db::repositories::{
    CompanyProfileRepository, LookupRepository, QuotationRepository, SalesTaskRepository,
    SqlCompanyProfileRepository, SqlLookupRepository, SqlQuotationRepository,
    SqlSalesTaskRepository, SqlUserRepository, UserRepository,
};
use freightdesk_db::DbPool;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{company, lookups, quotations, sales_tasks, users};

pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct AppState {
    pub sales_tasks: Arc<dyn SalesTaskRepository>,
    pub quotations: Arc<dyn QuotationRepository>,
    pub users: Arc<dyn UserRepository>,
    pub lookups: Arc<dyn LookupRepository>,
    pub company: Arc<dyn CompanyProfileRepository>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub fn sql(db_pool: DbPool) -> Self {
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        Self {
            sales_tasks: Arc::new(
                SqlSalesTaskRepository::new(db_pool.clone()).with_audit_sink(audit.clone()),
            ),
            quotations: Arc::new(SqlQuotationRepository::new(db_pool.clone())),
            users: Arc::new(SqlUserRepository::new(db_pool.clone())),
            lookups: Arc::new(SqlLookupRepository::new(db_pool.clone())),
            company: Arc::new(SqlCompanyProfileRepository::new(db_pool)),
            audit,
        }
    }

    #[cfg(test)]
    pub fn in_memory(audit: Arc<dyn AuditSink>) -> Self {
        use freightdesk_db::repositories::{
            InMemoryCompanyProfileRepository, InMemoryLookupRepository,
            InMemoryQuotationRepository, InMemorySalesTaskRepository, InMemoryUserRepository,
        };

        Self {
            sales_tasks: Arc::new(
                InMemorySalesTaskRepository::default().with_audit_sink(audit.clone()),
            ),
            quotations: Arc::new(InMemoryQuotationRepository::default()),
            users: Arc::new(InMemoryUserRepository::default()),
            lookups: Arc::new(InMemoryLookupRepository::default()),
            company: Arc::new(InMemoryCompanyProfileRepository::default()),
            audit,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(sales_tasks::routes())
        .merge(quotations::routes())
        .merge(users::routes())
        .merge(lookups::routes())
        .merge(company::routes())
        .with_state(state)
}

/// Caller identity and correlation id, read from request headers.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub actor: Actor,
    pub correlation_id: String,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };

        let actor = Actor { name: header(ACTOR_NAME_HEADER), email: header(ACTOR_EMAIL_HEADER) }
            .normalized();
        let correlation_id = header(CORRELATION_ID_HEADER)
            .or_else(|| header("x-request-id"))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self { actor, correlation_id }
    }

    pub fn audit(&self, subject: Option<&str>) -> AuditContext {
        AuditContext::new(
            subject.map(str::to_owned),
            self.correlation_id.clone(),
            self.actor.display(),
        )
    }

    pub fn fail(&self, error: impl Into<ApplicationError>) -> ApiError {
        ApiError(error.into().into_interface(self.correlation_id.clone()))
    }

    pub fn emit(
        &self,
        sink: &dyn AuditSink,
        subject: &str,
        event_type: &str,
        category: AuditCategory,
        metadata: &[(&str, &str)],
    ) {
        let audit_context = self.audit(Some(subject));
        let event = metadata.iter().fold(
            AuditEvent::new(&audit_context, event_type, category, AuditOutcome::Success),
            |event, (key, value)| event.with_metadata(*key, *value),
        );
        sink.emit(event);
    }

    pub fn body<T>(&self, payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
        payload.map(|Json(value)| value).map_err(|rejection| {
            self.fail(DomainError::validation("body", rejection.body_text()))
        })
    }

    pub fn query<T>(&self, params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        params.map(|Query(value)| value).map_err(|rejection| {
            self.fail(DomainError::validation("query", rejection.body_text()))
        })
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0.message(),
                "request failed"
            );
            self.0.user_message().to_owned()
        } else {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0.message(),
                "request rejected"
            );
            self.0.message().to_owned()
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use freightdesk_core::audit::InMemoryAuditSink;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{router, AppState, ACTOR_EMAIL_HEADER, ACTOR_NAME_HEADER};

    pub fn app() -> (Router, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        (router(AppState::in_memory(Arc::new(sink.clone()))), sink)
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        actor: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some((name, email)) = actor {
            request = request.header(ACTOR_NAME_HEADER, name).header(ACTOR_EMAIL_HEADER, email);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body bytes");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }
}
