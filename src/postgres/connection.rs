use std::pin::Pin;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio_postgres::{Config as PgConfig, CopyBothDuplex, NoTls, SimpleQueryMessage};
use tracing::{debug, error, info, warn};

use super::types::{Lsn, POSTGRES_EPOCH_MICROS};
use crate::config::Config;
use crate::{Error, Result};

/// A replication-mode connection to PostgreSQL.
///
/// Owns the `CopyBoth` duplex opened by `START_REPLICATION`: the readable
/// half delivers one complete `CopyData` payload per [`next_frame`] call
/// (nothing is read from the socket between pulls), and the writable half
/// carries standby status updates.
///
/// [`next_frame`]: ReplicationSession::next_frame
pub struct ReplicationSession {
    client: tokio_postgres::Client,
    connection_task: tokio::task::JoinHandle<()>,
    slot_name: String,
    publication: String,
    protocol_version: u32,
    include_messages: bool,
    stream: Option<Pin<Box<CopyBothDuplex<Bytes>>>>,
    aborted: bool,
}

impl ReplicationSession {
    /// Opens a connection in `replication=database` mode. Streaming does not
    /// begin until [`start`](ReplicationSession::start) is called.
    pub async fn connect(config: &Config) -> Result<Self> {
        info!(
            host = %config.postgres.host,
            port = config.postgres.port,
            database = %config.postgres.database,
            "Opening replication connection"
        );

        let pg_config: PgConfig = config
            .replication_url()
            .parse()
            .map_err(Error::Postgres)?;
        let (client, connection) = pg_config.connect(NoTls).await?;

        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Replication connection error: {e}");
            }
        });

        Ok(Self {
            client,
            connection_task,
            slot_name: config.postgres.slot_name.clone(),
            publication: config.postgres.publication.clone(),
            protocol_version: config.replication.protocol_version,
            include_messages: config.replication.include_messages,
            stream: None,
            aborted: false,
        })
    }

    pub async fn identify_system(&mut self) -> Result<SystemInfo> {
        debug!("Sending IDENTIFY_SYSTEM command");

        let rows = self.client.simple_query("IDENTIFY_SYSTEM").await?;
        for message in rows {
            if let SimpleQueryMessage::Row(row) = message {
                let info = SystemInfo {
                    system_id: row.get("systemid").unwrap_or("unknown").to_string(),
                    timeline: row.get("timeline").unwrap_or("1").parse().unwrap_or(1),
                    xlogpos: row.get("xlogpos").unwrap_or("0/0").to_string(),
                    dbname: row.get("dbname").map(|s| s.to_string()),
                };
                debug!("System info: {:?}", info);
                return Ok(info);
            }
        }

        Err(Error::Connection(
            "IDENTIFY_SYSTEM returned no rows".to_string(),
        ))
    }

    /// Creates the logical replication slot with the `pgoutput` plugin.
    /// A slot that already exists is not an error.
    pub async fn create_slot(&mut self) -> Result<()> {
        info!("Creating replication slot: {}", self.slot_name);

        let query = format!(
            "CREATE_REPLICATION_SLOT \"{}\" LOGICAL pgoutput NOEXPORT_SNAPSHOT",
            self.slot_name
        );

        match self.client.simple_query(&query).await {
            Ok(messages) => {
                for message in messages {
                    if let SimpleQueryMessage::Row(row) = message {
                        let slot = row.get("slot_name").unwrap_or("unknown");
                        let lsn = row.get("consistent_point").unwrap_or("unknown");
                        info!("Created replication slot '{}' at LSN {}", slot, lsn);
                    }
                }
                Ok(())
            }
            Err(e) if e.to_string().contains("already exists") => {
                info!("Replication slot '{}' already exists", self.slot_name);
                Ok(())
            }
            Err(e) => Err(Error::Postgres(e)),
        }
    }

    pub async fn drop_slot(&mut self) -> Result<()> {
        info!("Dropping replication slot: {}", self.slot_name);

        let query = format!("DROP_REPLICATION_SLOT \"{}\"", self.slot_name);
        match self.client.simple_query(&query).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("does not exist") => {
                warn!("Replication slot '{}' does not exist", self.slot_name);
                Ok(())
            }
            Err(e) => Err(Error::Postgres(e)),
        }
    }

    /// Issues `START_REPLICATION` and enters `CopyBoth` mode.
    ///
    /// `start_lsn` of `0/0` defers to the slot's restart point.
    pub async fn start(&mut self, start_lsn: Lsn) -> Result<()> {
        let options = format!(
            "proto_version '{}', publication_names '{}', messages '{}'",
            self.protocol_version, self.publication, self.include_messages
        );
        let command = format!(
            "START_REPLICATION SLOT \"{}\" LOGICAL {} ({})",
            self.slot_name, start_lsn, options
        );
        info!("Starting replication: {command}");

        let duplex = self.client.copy_both_simple::<Bytes>(&command).await?;
        self.stream = Some(Box::pin(duplex));
        Ok(())
    }

    /// Pulls the next `CopyData` payload. Returns `Ok(None)` on clean end:
    /// server `CopyDone`, server-initiated disconnect, or local disposal.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.aborted {
            return Ok(None);
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Connection("replication not started".to_string()))?;

        match stream.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) if e.is_closed() => {
                debug!("Replication stream terminated by server: {e}");
                Ok(None)
            }
            Some(Err(e)) => Err(Error::Postgres(e)),
            None => Ok(None),
        }
    }

    /// Reports `lsn` as received, flushed and applied. Acknowledging an LSN
    /// implicitly acknowledges everything before it; skipping acks is safe.
    pub async fn acknowledge(&mut self, lsn: Lsn) -> Result<()> {
        if self.aborted {
            return Ok(());
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Connection("replication not started".to_string()))?;

        let clock = Utc::now().timestamp_millis() * 1_000 - POSTGRES_EPOCH_MICROS;
        let packet = standby_status_update(lsn, clock);
        debug!(%lsn, "Sending standby status update");
        stream.send(packet).await?;
        Ok(())
    }

    /// Ends the session: stops reading, sends the client `CopyDone`, and
    /// closes the connection. Idempotent; pulls issued after this settle
    /// with end-of-stream and transport errors no longer surface.
    pub async fn close(&mut self) -> Result<()> {
        if self.aborted {
            return Ok(());
        }
        info!("Closing replication session");
        self.aborted = true;

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close().await {
                debug!("Error finishing copy stream: {e}");
            }
        }

        self.connection_task.abort();
        Ok(())
    }
}

/// Builds the 34-byte standby-status-update packet for `confirmed`.
///
/// All three position slots carry `confirmed + 1` (the first byte the
/// client has *not* yet consumed), and `clock_micros` is the client clock
/// in microseconds since the PostgreSQL epoch. The final byte leaves the
/// server's reply flag unset.
pub fn standby_status_update(confirmed: Lsn, clock_micros: i64) -> Bytes {
    let next = confirmed.advance();

    let mut buf = BytesMut::with_capacity(34);
    buf.put_u8(b'r');
    buf.put_u64(next.0); // received and written
    buf.put_u64(next.0); // flushed
    buf.put_u64(next.0); // applied
    buf.put_i64(clock_micros);
    buf.put_u8(0);
    buf.freeze()
}

#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub system_id: String,
    pub timeline: i32,
    pub xlogpos: String,
    pub dbname: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_update_is_exactly_34_bytes() {
        let packet = standby_status_update(Lsn::from_parts(0x16, 0x34FA0), 0);
        assert_eq!(packet.len(), 34);
        assert_eq!(packet[0], 0x72);
        assert_eq!(packet[33], 0x00);
    }

    #[test]
    fn status_update_reports_one_past_confirmed() {
        let packet = standby_status_update(Lsn::from_parts(0x16, 0x34FA0), 0);

        let expected = Lsn::from_parts(0x16, 0x34FA1).0.to_be_bytes();
        assert_eq!(&packet[1..9], &expected); // received and written
        assert_eq!(&packet[9..17], &expected); // flushed
        assert_eq!(&packet[17..25], &expected); // applied
    }

    #[test]
    fn status_update_rolls_low_half_over() {
        let packet = standby_status_update(Lsn::from_parts(7, 0xFFFFFFFF), 0);
        let expected = Lsn::from_parts(8, 0).0.to_be_bytes();
        assert_eq!(&packet[1..9], &expected);
    }

    #[test]
    fn status_update_carries_client_clock() {
        let clock: i64 = 0x0102_0304_0506_0708;
        let packet = standby_status_update(Lsn::ZERO, clock);
        assert_eq!(&packet[25..33], &clock.to_be_bytes());
    }
}
