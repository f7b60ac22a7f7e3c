pub mod session;

pub use session::GridSession;
