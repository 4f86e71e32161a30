pub mod directory;
pub mod geolocation;
pub mod traffic;
