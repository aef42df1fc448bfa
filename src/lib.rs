//! Filesystem-backed object store for an MTP responder.
//!
//! One [`FsStorage`] exports a native directory as an MTP storage: it owns
//! the object tree (handles, parent links, composed metadata), a PUOID
//! registry that keeps object identity stable across restarts, a durable
//! reference graph for abstract playlists, and the reconciliation of
//! filesystem changes made behind the responder's back.
//!
//! The wire protocol, session handling, and transport live elsewhere; this
//! crate speaks in handles, datasets, and response codes. External
//! services (the device-global handle allocator, the thumbnailer, the
//! metadata store, the change notifier) plug in through the traits in
//! [`collaborators`].
//!
//! ```no_run
//! use mtp_fs_store::{Collaborators, FsStorage, StorageConfig};
//!
//! let config = StorageConfig::new(0x0001_0001, "/home/user/MyDocs", "Phone", "Internal storage");
//! let mut storage = FsStorage::new(config, Collaborators::default());
//! storage.enumerate().expect("enumeration");
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod formats;
pub mod object_info;
pub mod puoid;
pub mod references;
pub mod storage;
pub mod tree;
pub mod types;
pub mod watcher;

pub use collaborators::{
    ChangeNotifier, Collaborators, EventSink, HandleAllocator, MetadataStore, NoThumbnailer, NoopMetadataStore,
    NullNotifier, PropSlot, PuoidAllocator, SequentialHandles, Thumbnailer,
};
pub use config::StorageConfig;
pub use error::{ResponseCode, Result};
pub use object_info::{ObjectInfo, StorageInfo};
pub use storage::FsStorage;
pub use types::{
    ObjectFormat, ObjectHandle, ObjectPropCode, PropValue, Puoid, StorageEvent, StorageType, HANDLE_ALL, ROOT_HANDLE,
};
pub use watcher::{FsChangeEvent, FsEventKind, NotifyWatcher};
