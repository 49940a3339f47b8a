pub mod error;
pub mod fetch;
pub mod package;
pub mod store;
pub mod weights;

pub use error::PackageError;
pub use fetch::ArchiveFetcher;
pub use package::{ModelPackage, PackageMetadata, PackageSource};
pub use store::PackageStore;
pub use weights::WeightsInfo;
