use crate::error::Result;
use crate::ids::WriteId;
use crate::protocol::OutgoingRequest;

/// Outbound side of the connection. Retries and backoff live behind it.
pub trait Transport {
    fn send(&mut self, request: OutgoingRequest) -> Result<()>;
}

/// Allocator for write ids. Ids must strictly increase.
pub trait WriteIdSource {
    fn next_write_id(&mut self) -> WriteId;
    fn last_write_id(&self) -> Option<WriteId>;
}

/// Counter starting at 1, one per connection.
#[derive(Clone, Debug, Default)]
pub struct SequentialWriteIds {
    last: Option<WriteId>,
}

impl SequentialWriteIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after ids handed out by an earlier session.
    pub fn starting_after(last: WriteId) -> Self {
        Self { last: Some(last) }
    }
}

impl WriteIdSource for SequentialWriteIds {
    fn next_write_id(&mut self) -> WriteId {
        let next = self.last.map_or(1, |last| last + 1);
        self.last = Some(next);
        next
    }

    fn last_write_id(&self) -> Option<WriteId> {
        self.last
    }
}

/// Records requests in memory; useful for tests and offline flows.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    sent: Vec<OutgoingRequest>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[OutgoingRequest] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<OutgoingRequest> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, request: OutgoingRequest) -> Result<()> {
        self.sent.push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;

    #[test]
    fn sequential_ids_increase_from_one() {
        let mut ids = SequentialWriteIds::new();
        assert_eq!(ids.last_write_id(), None);
        assert_eq!(ids.next_write_id(), 1);
        assert_eq!(ids.next_write_id(), 2);
        let mut resumed = SequentialWriteIds::starting_after(41);
        assert_eq!(resumed.next_write_id(), 42);
    }

    #[test]
    fn memory_transport_records_requests() {
        let mut transport = MemoryTransport::new();
        transport
            .send(OutgoingRequest::Unlisten {
                path: Path::root(),
                tag: None,
            })
            .unwrap();
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.take_sent().len(), 1);
        assert!(transport.sent().is_empty());
    }
}
