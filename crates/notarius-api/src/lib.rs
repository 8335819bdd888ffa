//! HTTP verification service for notarius signatures.
//!
//! Exposes the verification engine over `POST /verify`. Requests carry a
//! document hash and a base64 signature artifact; responses carry the
//! verdict. Undecodable requests, keys and tokens get `400`; other failed
//! verifications get `500`.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
