pub mod backend;
pub mod codec;
pub mod component;
pub mod differ;
pub mod legacy;
pub mod lifecycle;
pub mod router;
pub mod schema;
pub mod storage;
pub mod tree;
pub mod value;
pub mod xml;

pub use backend::{ChangeEvent, ChangeKind, ChangeSink, MemoryBackend, StorageBackend, StorageError};
pub use codec::{CodecError, FieldIssue, Outcome};
pub use component::{ComponentDescriptor, ComponentDescriptorBuilder, ComponentScope, RegistrationError};
pub use differ::{is_default, DefaultStateCache, EqualityStrategy};
pub use legacy::{DefaultExternalizer, Externalizable, LegacyDescriptor, LegacyError};
pub use lifecycle::{
    ComponentPhase, ComponentRegistry, LifecycleManager, LoadProblem, LoadReport, PersistentComponent,
    ReloadEvent, SaveError, SaveReport, SaveTrigger,
};
pub use router::{BlockUpdate, ProjectScheme, RoutingError, StorageDocument, StorageRouter};
pub use schema::{
    CollectionStyle, EntryForm, FieldDescriptor, FieldOptions, MappingTarget, PersistentState, Schema,
    SchemaBuilder, SchemaError,
};
pub use storage::{PathTemplate, Placeholder, RoamingType, SchemeFilter, StorageSpec, TemplateError};
pub use tree::StateTree;
pub use value::{NestedType, Persist, Value, ValueKind};
pub use xml::XmlError;
