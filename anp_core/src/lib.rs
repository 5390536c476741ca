pub mod description;
pub mod frame;
pub mod json;
pub mod method;
pub mod openrpc;
pub mod rpc;

/// A type alias for a boxed error that is thread-safe and sendable across threads.
/// This is commonly used as a return type for functions that can return various error types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A type alias for a pinned, boxed future that is sendable across threads.
pub type BoxPinFut<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

pub use description::{AgentDescription, InformationEntry, InterfaceEntry};
pub use frame::{decode_frame, encode_frame, FrameError, ProtocolType};
pub use method::{
    validate_method_name, CallContext, InterfaceMode, Method, MethodDefinition, MethodDyn,
    MethodProtocol, MethodSet, ParamDef,
};
pub use openrpc::{OpenRpcDocument, ParsedMethod};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
