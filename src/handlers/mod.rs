pub mod api;
pub mod events;
pub mod navigation_session;
pub mod remote_geolocation;
pub mod session_actor;
pub mod websocket_actor;
