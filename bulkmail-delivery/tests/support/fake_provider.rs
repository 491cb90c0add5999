//! A stand-in for the Resend `/emails` endpoint.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::post,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

/// How the fake answers.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// `200 {"id": "re_<n>"}` for every request
    Accept,
    /// Answer `status` with `body` for one recipient, accept the rest
    RejectRecipient {
        recipient: String,
        status: u16,
        body: Value,
    },
    /// Wait before answering, to trip client timeouts
    Hang(Duration),
    /// `200` with a body that is not a send response
    Garbage,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Debug)]
struct ProviderState {
    behaviour: Behaviour,
    requests: Mutex<Vec<Recorded>>,
}

pub struct FakeProvider {
    addr: SocketAddr,
    state: Arc<ProviderState>,
    handle: JoinHandle<()>,
}

impl FakeProvider {
    pub async fn start(behaviour: Behaviour) -> Self {
        let state = Arc::new(ProviderState {
            behaviour,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/emails", post(emails))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake provider");
        let addr = listener.local_addr().expect("local addr");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake provider");
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/emails", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().clone()
    }
}

impl Drop for FakeProvider {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn emails(
    State(state): State<Arc<ProviderState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let count = {
        let mut requests = state.requests.lock();
        requests.push(Recorded {
            authorization: headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string),
            body: body.clone(),
        });
        requests.len()
    };

    match &state.behaviour {
        Behaviour::RejectRecipient {
            recipient,
            status,
            body: error,
        } if body["to"][0] == recipient.as_str() => (
            StatusCode::from_u16(*status).expect("status"),
            Json(error.clone()),
        )
            .into_response(),
        Behaviour::Hang(duration) => {
            tokio::time::sleep(*duration).await;
            Json(json!({ "id": "re_late" })).into_response()
        }
        Behaviour::Garbage => "<html>ok</html>".into_response(),
        Behaviour::Accept | Behaviour::RejectRecipient { .. } => {
            Json(json!({ "id": format!("re_{count}") })).into_response()
        }
    }
}
