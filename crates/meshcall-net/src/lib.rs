// Signaling relay transports: in-process bus and libp2p GossipSub on the fixed
// signaling topic, plus the HTTP client of the call directory API.

pub mod behaviour;
pub mod directory;
pub mod discovery;
pub mod gossip;
pub mod relay;
pub mod swarm;
pub mod transport;

pub use behaviour::{MeshcallBehaviour, MeshcallEvent};
pub use directory::HttpCallDirectory;
pub use discovery::load_relay_addrs;
pub use gossip::GossipRelay;
pub use relay::{LocalRelay, RelayError, RelaySubscription, SignalingRelay};
pub use swarm::{spawn_swarm, SwarmCommand, SwarmConfig, SwarmNotification};
pub use transport::{build_swarm, signaling_gossipsub_config};
