//! End-to-end tests: a real server task on a loopback socket, driven by a
//! hand-rolled SMB1 test client.

pub mod file_operations;
pub mod smb1_helper;
pub mod test_context;

pub use smb1_helper::TestClient;
pub use test_context::TestContext;
