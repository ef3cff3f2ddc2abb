use clap::Parser;
use huddle_core::IceServerConfig;
use huddle_core::utils::DEFAULT_STUN_ADDRS;
use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Clone, Parser)]
#[command(name = "huddle-server", about = "Room signaling relay for browser peer meshes")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// STUN url handed to clients; repeatable. Public STUN servers when absent.
    #[arg(long = "stun")]
    pub stun: Vec<String>,

    /// TURN url handed to clients; repeatable.
    #[arg(long = "turn")]
    pub turn: Vec<String>,

    #[arg(long, requires = "turn")]
    pub turn_username: Option<String>,

    #[arg(long, requires = "turn")]
    pub turn_credential: Option<String>,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        let stun = if self.stun.is_empty() {
            DEFAULT_STUN_ADDRS.iter().map(|url| url.to_string()).collect()
        } else {
            self.stun.clone()
        };

        let mut servers = vec![IceServerConfig {
            urls: stun,
            username: None,
            credential: None,
        }];

        if !self.turn.is_empty() {
            servers.push(IceServerConfig {
                urls: self.turn.clone(),
                username: self.turn_username.clone(),
                credential: self.turn_credential.clone(),
            });
        }
        servers
    }
}
