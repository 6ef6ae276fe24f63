//! Infrastructure layer: every socket the relay touches.

pub mod control_tcp;
pub mod frame_reader;
pub mod http_server;
pub mod listener;
pub mod signaling;

pub use control_tcp::TcpControlLink;
pub use frame_reader::{read_frame, FrameReadError};
pub use http_server::{router, serve, AppState};
pub use listener::{open_session, StreamConnection, TransportError};
pub use signaling::{PeerRegistry, SignalingError};
