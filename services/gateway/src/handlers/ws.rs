use axum::{
    extract::{State, ws::WebSocketUpgrade},
    response::Response,
};
use market_data::websocket::serve_socket;

use crate::state::AppState;

/// Upgrade to a push session.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let ctx = state.session_context();
    let max_frame_size = ctx.config.max_frame_size;

    ws.max_frame_size(max_frame_size)
        .max_message_size(max_frame_size)
        .on_upgrade(move |socket| serve_socket(socket, ctx))
}
