pub mod model;
pub mod password;
pub mod repo;
pub mod tokens;

pub use model::{Gender, NewUser, Role, User, VerificationMethod};
pub use repo::{MemoryUserStore, PgUserStore, RecordScope, UserStore};
pub use tokens::{JwtKeys, SignOptions};
