//! The Global Deployment Manifest and the deployment model around it.

mod types;

pub use types::{
  DeployStatus, DeploySpec, Deployable, Deployment, DeploymentSet, DeploymentTargetId, Gdm, GdmError, Rectification,
  User,
};
