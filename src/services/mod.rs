//! Domain services: accounts, sessions, OAuth and clinics.

pub mod clinic;
pub mod email_password;
pub mod oauth;
pub mod password;
pub mod session;

#[cfg(all(test, feature = "live-db-tests"))]
pub mod test_support;
