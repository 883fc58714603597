//! Stream ownership under one connection.
//!
//! Streams live in a connection-scoped arena indexed by small integers.
//! Node 0 is always the connection root (the control context for frames on
//! stream id 0); every other node has exactly one parent and sits in its
//! parent's ordered child list. A stream is in that list if and only if it
//! is live, so the child count is just the list length.

use log::{debug, error};

use crate::error::StreamError;
use crate::session::{Application, HeaderStoreHandle};

/// Arena index of a live stream node.
pub(crate) type NodeId = usize;

/// The connection root node.
pub(crate) const ROOT: NodeId = 0;

/// Transmit credit granted to a stream before real negotiation applies.
pub const INITIAL_TX_CREDIT: i32 = 65535;

/// Default declared priority weight for new streams.
pub const DEFAULT_WEIGHT: u8 = 16;

/// One logical request/response exchange multiplexed on a connection.
///
/// The root node is a degenerate stream with id 0 that carries the
/// connection-level transmit credit and header-sequence flags.
#[derive(Debug)]
pub struct Stream {
    /// 31-bit wire identifier; 0 only on the root node.
    pub stream_id: u32,
    /// Remaining DATA bytes the peer has granted us. Signed: transient
    /// negative values are tolerated on the write path.
    pub tx_credit: i32,
    /// Declared priority weight.
    pub weight: u8,
    pub end_stream: bool,
    pub end_headers: bool,
    pub going_away: bool,
    pub initialized: bool,
    pub waiting_for_credit: bool,
    /// Header parsing finished for this stream's request.
    pub headers_complete: bool,
    /// Opaque store owned by the header sink, attached on first use.
    pub header_store: Option<HeaderStoreHandle>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Stream {
    fn new(stream_id: u32, parent: Option<NodeId>) -> Self {
        Self {
            stream_id,
            tx_credit: 0,
            weight: DEFAULT_WEIGHT,
            end_stream: false,
            end_headers: false,
            going_away: false,
            initialized: false,
            waiting_for_credit: false,
            headers_complete: false,
            header_store: None,
            parent,
            children: Vec::new(),
        }
    }
}

/// Arena of stream nodes rooted at the connection.
#[derive(Debug)]
pub(crate) struct StreamArena {
    nodes: Vec<Option<Stream>>,
}

impl StreamArena {
    /// New arena holding only the connection root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Stream::new(0, None))],
        }
    }

    pub fn get(&self, node: NodeId) -> Option<&Stream> {
        self.nodes.get(node).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut Stream> {
        self.nodes.get_mut(node).and_then(Option::as_mut)
    }

    pub fn child_count(&self, parent: NodeId) -> usize {
        self.get(parent).map_or(0, |s| s.children.len())
    }

    /// Total number of live streams, root excluded.
    pub fn stream_count(&self) -> usize {
        self.nodes.iter().flatten().count() - 1
    }

    /// Linear scan of `parent`'s children by stream id.
    pub fn find(&self, parent: NodeId, stream_id: u32) -> Option<NodeId> {
        let parent = self.get(parent)?;
        parent
            .children
            .iter()
            .copied()
            .find(|&c| self.get(c).map_or(false, |s| s.stream_id == stream_id))
    }

    /// Create a stream under `parent`, subject to the peer's concurrency
    /// limit, and request per-stream user data from the application. On
    /// allocation failure the stream is torn down again and the application
    /// gets a destroy notification.
    pub fn create_child<A: Application>(
        &mut self,
        parent: NodeId,
        stream_id: u32,
        max_concurrent: u32,
        app: &mut A,
    ) -> Result<NodeId, StreamError> {
        // no more children allowed by parent
        if self.child_count(parent) + 1 == max_concurrent as usize {
            return Err(StreamError::AdmissionRejected);
        }

        let mut stream = Stream::new(stream_id, Some(parent));
        stream.tx_credit = INITIAL_TX_CREDIT;

        let node = self.insert(stream);
        if let Some(p) = self.get_mut(parent) {
            p.children.push(node);
        }

        if !app.allocate_user_data(stream_id) {
            app.destroy_notify(stream_id);
            let _ = self.remove(node);
            return Err(StreamError::ResourceExhaustion);
        }

        debug!("new child stream sid {} (node {})", stream_id, node);
        Ok(node)
    }

    /// Look up a child of `parent` by stream id, creating it on a miss.
    pub fn find_or_create<A: Application>(
        &mut self,
        parent: NodeId,
        stream_id: u32,
        max_concurrent: u32,
        app: &mut A,
    ) -> Result<NodeId, StreamError> {
        match self.find(parent, stream_id) {
            Some(node) => Ok(node),
            None => self.create_child(parent, stream_id, max_concurrent, app),
        }
    }

    /// Unlink a stream from its parent's child list and drop it. Reports
    /// (does not panic) if the stream is not in the list.
    pub fn remove(&mut self, node: NodeId) -> Result<(), StreamError> {
        if node == ROOT {
            return Err(StreamError::NotFound);
        }
        let parent = match self.get(node).and_then(|s| s.parent) {
            Some(p) => p,
            None => {
                error!("remove: node {} has no parent", node);
                return Err(StreamError::NotFound);
            }
        };
        let found = match self.get_mut(parent) {
            Some(p) => {
                let before = p.children.len();
                p.children.retain(|&c| c != node);
                p.children.len() != before
            }
            None => false,
        };
        if !found {
            error!("remove: can't find node {} in parent child list", node);
            return Err(StreamError::NotFound);
        }
        self.nodes[node] = None;
        Ok(())
    }

    /// Walk parent links to the connection root.
    pub fn root_of(&self, mut node: NodeId) -> NodeId {
        while let Some(parent) = self.get(node).and_then(|s| s.parent) {
            node = parent;
        }
        node
    }

    fn insert(&mut self, stream: Stream) -> NodeId {
        match self.nodes.iter().position(Option::is_none) {
            Some(free) => {
                self.nodes[free] = Some(stream);
                free
            }
            None => {
                self.nodes.push(Some(stream));
                self.nodes.len() - 1
            }
        }
    }
}
