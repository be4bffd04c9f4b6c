pub mod password;
pub mod resolver;
pub mod session;

pub use resolver::resolve_user;
