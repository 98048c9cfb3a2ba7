//! In-memory testing for Daedalus applications.
//!
//! The [`TestClient`] drives any transport callable through the boundary
//! message types directly: no sockets, no ports. Requests are built with
//! a fluent API and responses collected into an inspectable
//! [`TestResponse`].
//!
//! # Example
//!
//! ```rust,ignore
//! use daedalus_test::TestClient;
//!
//! let client = TestClient::new(app);
//! client.startup().await.unwrap();
//!
//! let response = client.get("/profile/p?q=5").send().await;
//! assert_eq!(response.status(), 200);
//! assert_eq!(response.json_value()["id"], "p");
//! ```

mod client;
mod response;

pub use client::{TestClient, TestRequestBuilder};
pub use response::TestResponse;
