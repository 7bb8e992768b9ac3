mod init;
mod install;
mod lock;
mod mutate;
mod status;

pub use init::{project_init, ProjectInitRequest};
pub use install::project_install;
pub use mutate::{project_add, project_remove, ProjectAddRequest, ProjectRemoveRequest};
pub use status::project_status;

pub(crate) use lock::ProjectLock;
