// Copyright 2025 Cowboy AI, LLC.

//! [`KeyStore`] backed by NATS JetStream key-value buckets
//!
//! Two buckets hold the mapping: `<name>-keys` maps keys to ids and
//! `<name>-ids` maps ids back to keys and also holds the `next` counter, so
//! a reopened store resumes numbering after its existing ids. Bucket keys
//! are restricted to a small character set, so encoded keys are stored
//! hex-encoded.

use super::KeyStore;
use crate::errors::{CompositionError, CompositionResult};
use async_nats::jetstream::{self, kv};
use bytes::Bytes;
use tokio::runtime::Runtime;
use tracing::info;

const NEXT_ID_KEY: &str = "next";

/// Key store over two JetStream key-value buckets
///
/// The encoder is synchronous; this store owns a current-thread runtime
/// and blocks on every request.
pub struct NatsKvKeyStore {
    runtime: Runtime,
    keys: kv::Store,
    ids: kv::Store,
    name: String,
}

impl std::fmt::Debug for NatsKvKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsKvKeyStore").field("name", &self.name).finish()
    }
}

impl NatsKvKeyStore {
    /// Connect to `url` and open (or create) the buckets named after `name`
    pub fn connect(url: &str, name: &str) -> CompositionResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| store_error(name, e))?;

        let (keys, ids) = runtime.block_on(async {
            let client = async_nats::connect(url).await.map_err(|e| store_error(name, e))?;
            let context = jetstream::new(client);
            let keys = open_bucket(&context, name, "keys", "State and action keys to ids").await?;
            let ids = open_bucket(&context, name, "ids", "Ids to state and action keys").await?;
            Ok::<_, CompositionError>((keys, ids))
        })?;

        info!(url, bucket = name, "connected NATS key store");
        Ok(Self {
            runtime,
            keys,
            ids,
            name: name.to_string(),
        })
    }

    fn error(&self, err: impl std::fmt::Display) -> CompositionError {
        store_error(&self.name, err)
    }
}

async fn open_bucket(
    context: &jetstream::Context,
    name: &str,
    suffix: &str,
    description: &str,
) -> CompositionResult<kv::Store> {
    context
        .create_key_value(kv::Config {
            bucket: format!("{name}-{suffix}"),
            description: description.to_string(),
            history: 1,
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        })
        .await
        .map_err(|e| store_error(name, e))
}

fn store_error(name: &str, err: impl std::fmt::Display) -> CompositionError {
    CompositionError::KeyStore {
        store: name.to_string(),
        message: err.to_string(),
    }
}

fn parse_id(value: &[u8]) -> Option<u64> {
    std::str::from_utf8(value).ok().and_then(|s| s.parse::<u64>().ok())
}

fn hex_key(key: &str) -> String {
    key.bytes().map(|b| format!("{b:02x}")).collect()
}

impl KeyStore for NatsKvKeyStore {
    fn get(&self, key: &str) -> CompositionResult<Option<u64>> {
        let entry = self
            .runtime
            .block_on(self.keys.get(hex_key(key)))
            .map_err(|e| self.error(e))?;
        entry
            .map(|value| parse_id(&value).ok_or_else(|| self.error(format!("corrupt id stored for {key}"))))
            .transpose()
    }

    fn put(&mut self, key: &str, id: u64) -> CompositionResult<()> {
        self.runtime
            .block_on(self.keys.put(hex_key(key), Bytes::from(id.to_string())))
            .map_err(|e| self.error(e))?;
        self.runtime
            .block_on(self.ids.put(id.to_string(), Bytes::from(key.to_string())))
            .map_err(|e| self.error(e))?;
        if id >= self.next_id()? {
            self.runtime
                .block_on(self.ids.put(NEXT_ID_KEY, Bytes::from((id + 1).to_string())))
                .map_err(|e| self.error(e))?;
        }
        Ok(())
    }

    fn reverse(&self, id: u64) -> CompositionResult<Option<String>> {
        let entry = self
            .runtime
            .block_on(self.ids.get(id.to_string()))
            .map_err(|e| self.error(e))?;
        entry
            .map(|value| String::from_utf8(value.to_vec()).map_err(|e| self.error(e)))
            .transpose()
    }

    fn next_id(&self) -> CompositionResult<u64> {
        let entry = self
            .runtime
            .block_on(self.ids.get(NEXT_ID_KEY))
            .map_err(|e| self.error(e))?;
        match entry {
            Some(value) => parse_id(&value).ok_or_else(|| self.error("corrupt next id counter")),
            None => Ok(0),
        }
    }
}
