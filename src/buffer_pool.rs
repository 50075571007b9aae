use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, LazyLock};

use crossbeam_queue::ArrayQueue;

use crate::protocol::reply::ReplyFrame;

const POOL_CAPACITY: usize = 128;

pub static GLOBAL_BUFFER_POOL: LazyLock<Arc<BufferPool>> =
    LazyLock::new(|| Arc::new(BufferPool::default()));

/// A pooled `Vec<u8>` that returns itself to the pool on drop.
pub struct PooledBuffer {
    pool: Arc<BufferPool>,
    inner: ManuallyDrop<Vec<u8>>,
}

impl PooledBuffer {
    fn new(pool: Arc<BufferPool>, vec: Vec<u8>) -> Self {
        Self {
            pool,
            inner: ManuallyDrop::new(vec),
        }
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // SAFETY: inner is never accessed after this
        let vec = unsafe { ManuallyDrop::take(&mut self.inner) };
        self.pool.return_buffer(vec);
    }
}

/// Frame backing storage shared within a connection
#[derive(Debug)]
pub struct BufferPool {
    buffers: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: ArrayQueue::new(capacity),
        }
    }

    /// Borrow a buffer that goes back to the pool when the handle drops
    pub fn get_buffer(self: &Arc<Self>) -> PooledBuffer {
        PooledBuffer::new(Arc::clone(self), self.take_buffer())
    }

    /// Take a buffer out of the pool; the caller owns returning it
    pub fn take_buffer(&self) -> Vec<u8> {
        self.buffers.pop().unwrap_or_default()
    }

    pub fn return_buffer(&self, mut vec: Vec<u8>) {
        // Clear but preserve capacity
        vec.clear();
        // Ignore if pool is full
        let _ = self.buffers.push(vec);
    }

    pub fn idle(&self) -> usize {
        self.buffers.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(POOL_CAPACITY)
    }
}

/// A pooled `ReplyFrame` that returns itself to its pool on drop.
///
/// The reply's backing storage is handed back to the [`BufferPool`] at that
/// point, not when the reply is reset for a new response.
pub struct PooledReply {
    pool: Arc<ReplyPool>,
    inner: ManuallyDrop<ReplyFrame>,
}

impl Deref for PooledReply {
    type Target = ReplyFrame;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PooledReply {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for PooledReply {
    fn drop(&mut self) {
        // SAFETY: inner is never accessed after this
        let reply = unsafe { ManuallyDrop::take(&mut self.inner) };
        self.pool.return_reply(reply);
    }
}

impl std::fmt::Debug for PooledReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledReply").field(&*self.inner).finish()
    }
}

/// Reply objects reused across responses on one connection
#[derive(Debug)]
pub struct ReplyPool {
    replies: ArrayQueue<ReplyFrame>,
    buffers: Arc<BufferPool>,
}

impl ReplyPool {
    pub fn new(capacity: usize, buffers: Arc<BufferPool>) -> Self {
        Self {
            replies: ArrayQueue::new(capacity),
            buffers,
        }
    }

    pub fn get_reply(self: &Arc<Self>) -> PooledReply {
        let mut reply = self.replies.pop().unwrap_or_default();
        reply.attach_storage(self.buffers.take_buffer(), self.buffers.take_buffer());
        PooledReply {
            pool: Arc::clone(self),
            inner: ManuallyDrop::new(reply),
        }
    }

    pub fn return_reply(&self, mut reply: ReplyFrame) {
        let (data, scratch) = reply.detach_storage();
        self.buffers.return_buffer(data);
        self.buffers.return_buffer(scratch);
        reply.reset();
        // Ignore if pool is full
        let _ = self.replies.push(reply);
    }

    pub fn idle(&self) -> usize {
        self.replies.len()
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffers
    }
}
