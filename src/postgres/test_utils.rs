use bytes::{BufMut, Bytes, BytesMut};

/// Wire-format tuple fields for mock messages.
#[derive(Debug, Clone)]
pub enum MockValue {
    Null,
    Text(String),
    Binary(Vec<u8>),
    /// An unchanged TOAST datum (`u` kind byte, no payload).
    Unchanged,
}

impl MockValue {
    pub fn text(value: &str) -> Self {
        MockValue::Text(value.to_string())
    }
}

/// Assembles bit-exact replication frames for decoder tests.
///
/// Every `*_message` method produces a full `CopyData` payload: the
/// XLogData envelope followed by one pgoutput message.
pub struct MockMessageBuilder {
    lsn: u64,
    timestamp: i64,
}

impl MockMessageBuilder {
    pub fn new() -> Self {
        Self {
            lsn: 1000,
            // 2023-10-15 10:30:00 UTC in microseconds since 2000-01-01.
            timestamp: 750_681_000_000_000,
        }
    }

    pub fn with_lsn(mut self, lsn: u64) -> Self {
        self.lsn = lsn;
        self
    }

    fn xlogdata_header(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'w');
        buf.put_u64(self.lsn); // message start
        buf.put_u64(self.lsn + 100); // current end
        buf.put_i64(self.timestamp);
        buf
    }

    pub fn keepalive_frame(&self, should_respond: bool) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(b'k');
        buf.put_u64(self.lsn);
        buf.put_i64(self.timestamp);
        buf.put_u8(should_respond as u8);
        buf.freeze()
    }

    pub fn begin_message(&self, xid: u32) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'B');
        buf.put_u64(self.lsn); // commit LSN
        buf.put_i64(self.timestamp);
        buf.put_u32(xid);
        buf.freeze()
    }

    pub fn commit_message(&self) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'C');
        buf.put_u8(0); // flags
        buf.put_u64(self.lsn);
        buf.put_u64(self.lsn + 100); // end LSN
        buf.put_i64(self.timestamp);
        buf.freeze()
    }

    pub fn origin_message(&self, name: &str) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'O');
        buf.put_u64(self.lsn);
        put_cstr(&mut buf, name);
        buf.freeze()
    }

    pub fn type_message(&self, oid: u32, schema: &str, name: &str) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'Y');
        buf.put_u32(oid);
        put_cstr(&mut buf, schema);
        put_cstr(&mut buf, name);
        buf.freeze()
    }

    /// Columns are `(name, type_oid, is_key)`.
    pub fn relation_message(
        &self,
        rel_id: u32,
        schema: &str,
        table: &str,
        replica_identity: u8,
        columns: &[(&str, u32, bool)],
    ) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'R');
        buf.put_u32(rel_id);
        put_cstr(&mut buf, schema);
        put_cstr(&mut buf, table);
        buf.put_u8(replica_identity);
        buf.put_i16(columns.len() as i16);

        for (name, type_oid, is_key) in columns {
            buf.put_u8(if *is_key { 1 } else { 0 });
            put_cstr(&mut buf, name);
            buf.put_u32(*type_oid);
            buf.put_i32(-1); // type modifier
        }

        buf.freeze()
    }

    pub fn insert_message(&self, rel_id: u32, values: &[MockValue]) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'I');
        buf.put_u32(rel_id);
        buf.put_u8(b'N');
        put_tuple(&mut buf, values);
        buf.freeze()
    }

    /// `old` carries the submessage byte (`b'O'` or `b'K'`) and the tuple.
    pub fn update_message(
        &self,
        rel_id: u32,
        old: Option<(u8, &[MockValue])>,
        new: &[MockValue],
    ) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'U');
        buf.put_u32(rel_id);

        if let Some((submessage, values)) = old {
            buf.put_u8(submessage);
            put_tuple(&mut buf, values);
        }

        buf.put_u8(b'N');
        put_tuple(&mut buf, new);
        buf.freeze()
    }

    pub fn delete_message(&self, rel_id: u32, submessage: u8, values: &[MockValue]) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'D');
        buf.put_u32(rel_id);
        buf.put_u8(submessage);
        put_tuple(&mut buf, values);
        buf.freeze()
    }

    pub fn truncate_message(&self, rel_ids: &[u32], flags: u8) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'T');
        buf.put_i32(rel_ids.len() as i32);
        buf.put_u8(flags);
        for rel_id in rel_ids {
            buf.put_u32(*rel_id);
        }
        buf.freeze()
    }

    pub fn logical_message(&self, transactional: bool, prefix: &str, content: &[u8]) -> Bytes {
        let mut buf = self.xlogdata_header();
        buf.put_u8(b'M');
        buf.put_u8(transactional as u8);
        buf.put_u64(self.lsn);
        put_cstr(&mut buf, prefix);
        buf.put_i32(content.len() as i32);
        buf.put(content);
        buf.freeze()
    }
}

fn put_cstr(buf: &mut BytesMut, text: &str) {
    buf.put(text.as_bytes());
    buf.put_u8(0);
}

fn put_tuple(buf: &mut BytesMut, values: &[MockValue]) {
    buf.put_i16(values.len() as i16);
    for value in values {
        match value {
            MockValue::Null => buf.put_u8(b'n'),
            MockValue::Text(text) => {
                buf.put_u8(b't');
                buf.put_i32(text.len() as i32);
                buf.put(text.as_bytes());
            }
            MockValue::Binary(data) => {
                buf.put_u8(b'b');
                buf.put_i32(data.len() as i32);
                buf.put(data.as_slice());
            }
            MockValue::Unchanged => buf.put_u8(b'u'),
        }
    }
}
