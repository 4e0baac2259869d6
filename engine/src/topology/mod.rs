//! Device-to-endpoint resolution

pub mod gns3;
pub mod resolver;
pub mod static_map;

pub use gns3::Gns3TopologyResolver;
pub use resolver::TopologyResolver;
pub use static_map::StaticTopologyResolver;
