pub type ContextId = u64;

/// Worklet ids are content hashes minted by the build tooling.
pub type WorkletId = String;

/// Ties foreign-function handles to the invocation that captured them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionId(pub u32);

/// Slot handle into the worklet reference table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RefId(pub u32);

/// Cross-context function handle, owned by the foreign side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FnHandleId(pub u32);

/// Foreign element reference as it appears inside a closure graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementRef(pub u32);
