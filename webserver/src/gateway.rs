use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use deploy_defs::{DeployRequest, DeploymentOutcome, GatewayError, SecretToken};
use deploy_runner::Deployer;
use log::{error, warn};
use std::sync::Arc;

struct GatewayState {
    deployer: Arc<dyn Deployer>,
    deploy_token: SecretToken,
}

/// Builds the `POST /deploy` webhook router.
pub fn create_router(deployer: Arc<dyn Deployer>, deploy_token: SecretToken) -> Router {
    let state = Arc::new(GatewayState {
        deployer,
        deploy_token,
    });

    Router::new()
        .route("/deploy", post(deploy_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Checks a raw request in order: JSON shape, then token, then application
/// name. Nothing is deployed unless all three pass.
pub fn validate_request(
    body: &[u8],
    authorization: Option<&str>,
    deploy_token: &SecretToken,
) -> Result<DeployRequest, GatewayError> {
    let request: DeployRequest = serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;

    if !authorization.is_some_and(|supplied| deploy_token.matches(supplied)) {
        return Err(GatewayError::Unauthorized);
    }

    if request.application_name.is_empty() {
        return Err(GatewayError::MissingApplicationName);
    }

    Ok(request)
}

async fn deploy_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let request = match validate_request(&body, authorization, &state.deploy_token) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected deploy request: {}", e);
            return rejection_response(&e);
        }
    };

    let outcome = state.deployer.deploy(&request).await;
    outcome_response(&outcome)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn rejection_response(err: &GatewayError) -> Response {
    let (status, message) = match err {
        GatewayError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "Invalid JSON payload."),
        GatewayError::Unauthorized => (StatusCode::UNAUTHORIZED, "Invalid token."),
        GatewayError::MissingApplicationName => {
            (StatusCode::BAD_REQUEST, "No application name provided.")
        }
    };
    (status, format!("{}\n", message)).into_response()
}

// Pipeline details go to the log only, never to the caller.
fn outcome_response(outcome: &DeploymentOutcome) -> Response {
    match outcome {
        DeploymentOutcome::Succeeded { application_name } => (
            StatusCode::OK,
            format!("Application '{}' updated successfully.\n", application_name),
        )
            .into_response(),
        DeploymentOutcome::Failed {
            application_name,
            stage,
            error,
        } => {
            error!(
                "Deploy request for '{}' failed at stage {}: {}",
                application_name, stage, error
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update Docker container.\n",
            )
                .into_response()
        }
    }
}
