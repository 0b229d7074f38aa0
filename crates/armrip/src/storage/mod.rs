//! Filesystem side of a job: naming, relocation into the library, data disc
//! copies and permission normalisation.

pub mod copy;
pub mod naming;
pub mod permissions;
pub mod relocate;

pub use copy::copy_tree;
pub use naming::{clean_for_filename, data_dir, job_dir_name, library_dir, library_segment, work_dir};
pub use permissions::set_permissions;
pub use relocate::{
    relocate_dir, remove_dir_if_exists, resolve_conflict, DestinationLock, MainFeatureRename,
    RelocationReport,
};
