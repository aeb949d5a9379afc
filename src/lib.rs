//! Embedded websocket control channel.
//!
//! A small RFC 6455 server meant to live inside another process, such
//! as a profiler or a telemetry agent, and talk to a browser or a tool.
//!
//! ## Features
//! - One server thread, readiness based, no async runtime.
//! - Plain tcp or tls (feature `tls`, on by default).
//! - Keepalive pings and idle timeout.
//! - Thread safe client handles.
//!
//! ## High-level API
//!
//! - [`settings`]
//! - [`server`]
//! - [`connection`]
//!
//! ```ignore
//! {
//!     let settings = Settings::new().port(6363).on_new_client(|server, client| {
//!         client.set_on_data(|handle, data, is_binary| {
//!             // echo
//!             let _ = handle.send_binary(data);
//!         });
//!         client.set_on_delete(|handle| println!("{} left", handle.peer_addr()));
//!     });
//!     let server = Server::start(settings)?;
//!     server.handle().broadcast_text("tick");
//! }
//! ```
//!
//! ## Low-level API
//!
//! - [`frame`]
//! - [`handshake`]
//!
//! Frame:
//!
//! ```ignore
//! {
//!     // encode a server frame
//!     let buf = frame::encode(OpCode::Text, b"hello");
//!
//!     // decode a frame
//!     match frame::decode(&buf) {
//!         Decoded::Frame(frame, n) => {},
//!         Decoded::NeedMore(n) => {},
//!         Decoded::Invalid(e) => {},
//!     }
//! }
//! ```
//!
//! Handshake:
//!
//! ```ignore
//! {
//!     let (request, n) = Request::decode(&buf)?;
//!     let accept = derive_accept_key(request.sec_key);
//!     Response::new(accept.as_bytes(), &[]).encode(&mut out);
//! }
//! ```
//!

pub mod error;
pub mod frame;
pub mod handshake;
pub mod settings;
pub mod transport;
pub mod connection;
pub mod server;

pub use error::Error;
pub use settings::Settings;
pub use server::{Server, ServerHandle};
pub use connection::{Client, ClientHandle};
