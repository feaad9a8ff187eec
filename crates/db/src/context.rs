/// Per-connection state the dispatcher writes into: the outbound send
/// buffer with its write offset, and the connection's current transaction.
/// Only the serving thread touches a context.
pub struct Context {
    pub data_send: Vec<u8>,
    pub offset: usize,
    pub txn_id: u64,
}

impl Context {
    pub fn new(txn_id: u64) -> Self {
        Self {
            data_send: Vec::new(),
            offset: 0,
            txn_id,
        }
    }

    /// Appends text at the current offset and advances it.
    pub fn write(&mut self, text: &str) {
        self.data_send.extend_from_slice(text.as_bytes());
        self.offset += text.len();
    }

    pub fn send_text(&self) -> String {
        String::from_utf8_lossy(&self.data_send).into_owned()
    }
}
