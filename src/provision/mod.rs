//! Host and runtime preparation performed before the stack starts.
mod flow;
mod gateway;
mod images;
mod ownership;
mod secrets;
mod volumes;

pub use flow::FlowAdmin;
pub use gateway::seed_startup_script;
pub use images::pull_all;
pub use ownership::{relabel_for_containers, OwnershipFixer, Target};
pub use secrets::{provision_secrets, OsRandom, SecretGenerator, Secrets};
pub use volumes::VolumeLifecycle;
