pub mod api_key;
pub mod auth_session;
pub mod auth_state;
pub mod membership;
pub mod provider;
pub mod team;
pub mod user;

pub use api_key::{ApiKey, API_KEY_PREFIX};
pub use auth_session::{AuthSession, SessionRecord};
pub use auth_state::AuthState;
pub use membership::{Invite, TeamMember, TeamRole};
pub use provider::OAuthProvider;
pub use team::Team;
pub use user::User;
