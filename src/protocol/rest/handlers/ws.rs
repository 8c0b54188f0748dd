//! `/ws`: progress-bus subscription plus `CREATE_SOLUTIONS`/`STOP_SOLUTION`/
//! `GET_SESSION` commands (spec §6).

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::engine::SolutionRequestSpec;
use crate::progress::ProgressEvent;
use crate::protocol::rest::dto::{StopSolutionPayload, WsCommand, WsPush};
use crate::protocol::AppState;

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let permit = match &state.ws_connections {
        Some(semaphore) => match semaphore.clone().try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => return (StatusCode::SERVICE_UNAVAILABLE, "too many websocket connections").into_response(),
        },
        None => None,
    };
    ws.on_upgrade(move |socket| async move {
        handle_connection(socket, state).await;
        drop(permit);
    })
    .into_response()
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<WsPush>();

    loop {
        tokio::select! {
            push = push_rx.recv() => {
                let Some(push) = push else { break };
                if send_json(&mut sender, &push).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_command(&text, &state, &push_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "ws receive error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn send_json(sender: &mut (impl SinkExt<Message> + Unpin), push: &WsPush) -> Result<(), ()> {
    let json = match serde_json::to_string(push) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "failed to serialize WsPush");
            return Err(());
        }
    };
    sender.send(Message::Text(json)).await.map_err(|_| ())
}

async fn handle_command(text: &str, state: &AppState, push_tx: &mpsc::UnboundedSender<WsPush>) {
    let command: WsCommand = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(e) => {
            let _ = push_tx.send(WsPush::Error { message: format!("invalid command: {e}") });
            return;
        }
    };

    match command {
        WsCommand::CreateSolutions { payload } => {
            let spec: SolutionRequestSpec = payload.into();
            let request_id = state.engine.submit(spec);
            let _ = push_tx.send(WsPush::Ack { request_id: request_id.clone() });
            spawn_progress_fanin(state.clone(), request_id, push_tx.clone());
        }
        WsCommand::StopSolution { payload: StopSolutionPayload { request_id } } => {
            let stopped = state.engine.stop_solution_request(&request_id).await;
            if stopped {
                let _ = push_tx.send(WsPush::Ack { request_id });
            } else {
                let _ = push_tx.send(WsPush::Error { message: format!("no active request '{request_id}'") });
            }
        }
        WsCommand::GetSession => {
            let _ = push_tx.send(WsPush::Ack { request_id: String::new() });
        }
    }
}

/// Fans request-level and per-solution progress-bus events into `push_tx`
/// for the lifetime of the request (spec §5: always-latest, never blocks the
/// engine on a slow subscriber — this task is the slow subscriber).
fn spawn_progress_fanin(state: AppState, request_id: String, push_tx: mpsc::UnboundedSender<WsPush>) {
    tokio::spawn(async move {
        let Some(mut request_rx) = state.progress.subscribe_request(&request_id) else {
            return;
        };
        let mut known_solutions = std::collections::HashSet::new();
        let mut solution_rxs: Vec<watch::Receiver<ProgressEvent>> = Vec::new();

        loop {
            for solution_id in state.progress.solutions_for_request(&request_id) {
                if known_solutions.insert(solution_id.clone()) {
                    if let Some(rx) = state.progress.subscribe_solution(&solution_id) {
                        if push_tx.send(WsPush::Progress(rx.borrow().clone())).is_err() {
                            return;
                        }
                        solution_rxs.push(rx);
                    }
                }
            }

            let solution_wait = async {
                if solution_rxs.is_empty() {
                    std::future::pending::<usize>().await
                } else {
                    let (result, index, _) =
                        futures_util::future::select_all(solution_rxs.iter_mut().map(|rx| Box::pin(rx.changed()))).await;
                    if result.is_err() {
                        return solution_rxs.len();
                    }
                    index
                }
            };

            tokio::select! {
                changed = request_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let event = request_rx.borrow().clone();
                    let terminal = matches!(event.progress, crate::model::Progress::Completed | crate::model::Progress::Errored);
                    if push_tx.send(WsPush::Progress(event)).is_err() {
                        return;
                    }
                    if terminal {
                        break;
                    }
                }
                idx = solution_wait => {
                    if idx < solution_rxs.len() {
                        let event = solution_rxs[idx].borrow().clone();
                        if push_tx.send(WsPush::Progress(event)).is_err() {
                            return;
                        }
                    }
                }
            }
        }
        debug!(request_id = %request_id, "progress fan-in finished");
    });
}
