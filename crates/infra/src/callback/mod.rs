//! Redirect transports feeding the authorization session

pub mod scheme;
pub mod server;

pub use scheme::{
    ProtocolClientRegistrar, SchemeCallbackListener, SchemePrivileges, SchemeRegistration,
    SchemeRegistry,
};
pub use server::{CallbackServerConfig, LoopbackCallbackServer};
