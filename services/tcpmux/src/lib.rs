pub mod config;
pub mod legal;
pub mod proxy;

pub use config::{ClassTarget, Config, Target};
pub use proxy::{
    encode_proxy_header_v2, Class, ForwardError, Forwarder, Mux, MuxOptions, ProxyHeader,
    PROXY_V2_SIGNATURE,
};
