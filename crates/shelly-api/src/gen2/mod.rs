//! Gen2 JSON-RPC API, over HTTP ([`Gen2Client`]) and WebSocket
//! ([`websocket::WebSocketClient`]).

mod client;
mod models;
pub mod websocket;

pub use client::Gen2Client;
pub use models::{
    Gen2Config, Gen2DeviceInfo, Gen2Status, InboundFrame, RpcErrorBody, RpcFrame, RpcRequest,
    parse_component_key, set_command,
};
pub use websocket::{ReconnectPolicy, WebSocketClient, WsEvent, WsEventKind, WsState};
