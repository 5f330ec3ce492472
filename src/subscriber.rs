use crate::config::Config;
use crate::postgres::{Lsn, PgOutputDecoder, ReplicationSession, SystemInfo, WalFrame};
use crate::Result;

/// High-level logical replication consumer: pulls raw frames from the
/// [`ReplicationSession`] and decodes each into one [`WalFrame`].
///
/// Frames arrive already message-aligned, so there is no buffering or
/// reassembly here: one pulled payload in, one decoded event out.
pub struct Subscriber {
    session: ReplicationSession,
    decoder: PgOutputDecoder,
    start_lsn: Lsn,
}

impl Subscriber {
    /// Connects the underlying replication session. Streaming starts on
    /// [`start`](Subscriber::start).
    pub async fn connect(config: &Config) -> Result<Self> {
        let session = ReplicationSession::connect(config).await?;
        Ok(Self {
            session,
            decoder: PgOutputDecoder::new(),
            start_lsn: config.replication.start_lsn,
        })
    }

    pub async fn identify_system(&mut self) -> Result<SystemInfo> {
        self.session.identify_system().await
    }

    pub async fn create_slot(&mut self) -> Result<()> {
        self.session.create_slot().await
    }

    pub async fn drop_slot(&mut self) -> Result<()> {
        self.session.drop_slot().await
    }

    /// Begins streaming from the configured start position.
    pub async fn start(&mut self) -> Result<()> {
        self.session.start(self.start_lsn).await
    }

    /// Pulls and decodes the next frame. `Ok(None)` means the stream ended
    /// cleanly (server disconnect or [`close`](Subscriber::close)).
    pub async fn next_event(&mut self) -> Result<Option<WalFrame>> {
        match self.session.next_frame().await? {
            Some(frame) => Ok(Some(self.decoder.decode_frame(&frame)?)),
            None => Ok(None),
        }
    }

    /// Confirms everything up to and including `lsn`, advancing the slot's
    /// flush position on the server.
    pub async fn acknowledge(&mut self, lsn: Lsn) -> Result<()> {
        self.session.acknowledge(lsn).await
    }

    /// Shuts the session down. Idempotent; a pull issued afterwards
    /// returns end-of-stream.
    pub async fn close(&mut self) -> Result<()> {
        self.session.close().await
    }
}
