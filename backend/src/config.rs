use std::net::SocketAddr;

use anyhow::{Context, Result};

use crate::lobby::DEFAULT_PAGE_SIZE;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Without a database the process keeps matches in memory.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub lobby_page_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8000".to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address like 127.0.0.1:8000")?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => 5,
        };
        let lobby_page_size = match lookup("LOBBY_PAGE_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("LOBBY_PAGE_SIZE is not a number: {raw}"))?,
            None => DEFAULT_PAGE_SIZE,
        };

        Ok(Self {
            bind_addr,
            database_url,
            database_max_connections,
            lobby_page_size,
        })
    }
}
