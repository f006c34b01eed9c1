use std::mem;

use skein_heap::{same_heap, Heap, SharedHeap};
use skein_node::{Lifecycle, Node};
use skein_types::error::{SkeinError, SkeinResult};
use skein_types::primitives::Form;
use skein_types::tags::{Derived, Usage};
use tracing::{debug, trace};

use crate::body::{Growth, YarnBody};

/// Outcome of copying a yarn's content into another yarn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readout {
    /// Bytes written to the destination.
    pub copied: usize,
    /// Bytes that did not fit a caller-owned destination.
    pub more: usize,
}

impl Readout {
    pub fn is_complete(&self) -> bool {
        self.more == 0
    }
}

/// How [`Yarn::transfer`] moved content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// The destination took over the source buffer; the source is empty.
    Adopted,
    /// The bytes were copied; the source is unchanged.
    Copied(Readout),
}

/// Refcounted byte buffer node.
///
/// A yarn carries string or blob content across the engine boundary. Its
/// buffer is either heap-owned (allocated through the yarn's heap, grown on
/// demand, released on close) or caller-owned (lent by the caller, never
/// reallocated, handed back through [`Yarn::reclaim_buffer`]).
pub struct Yarn {
    node: Node,
    body: YarnBody,
    growth: Growth,
}

impl Yarn {
    /// An empty yarn with no buffer.
    pub fn new(usage: Usage, heap: SharedHeap) -> Self {
        Self {
            node: Node::new(usage, heap, Derived::Yarn),
            body: YarnBody::default(),
            growth: Growth::default(),
        }
    }

    /// An empty yarn with a heap-owned buffer of `capacity` bytes.
    pub fn with_capacity(usage: Usage, heap: SharedHeap, capacity: usize) -> SkeinResult<Self> {
        let mut yarn = Self::new(usage, heap);
        if capacity > 0 {
            match yarn.node.heap().alloc_block(capacity) {
                Ok(block) => yarn.body.buf = block,
                Err(err) => {
                    yarn.close()?;
                    return Err(err);
                }
            }
        }
        Ok(yarn)
    }

    pub fn with_growth(mut self, growth: Growth) -> Self {
        self.growth = growth;
        self
    }

    pub fn growth(&self) -> Growth {
        self.growth
    }

    pub fn body(&self) -> &YarnBody {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.fill
    }

    pub fn is_empty(&self) -> bool {
        self.body.fill == 0
    }

    pub fn capacity(&self) -> usize {
        self.body.capacity()
    }

    pub fn form(&self) -> Form {
        self.body.form
    }

    pub fn is_caller_owned(&self) -> bool {
        self.body.caller_owned
    }

    // ─── Reading ─────────────────────────────────────────────────────────────

    /// Content and its form.
    pub fn bytes(&self) -> SkeinResult<(&[u8], Form)> {
        self.node.check_open("read")?;
        Ok((self.body.content(), self.body.form))
    }

    /// Borrow the content without copying. The slice is valid until the
    /// next mutation of this yarn.
    pub fn alias(&self) -> SkeinResult<&[u8]> {
        self.node.check_open("alias")?;
        Ok(self.body.content())
    }

    /// Content as text, when it is valid UTF-8.
    pub fn as_str(&self) -> SkeinResult<Option<&str>> {
        Ok(std::str::from_utf8(self.alias()?).ok())
    }

    /// Copy this yarn's content into `out`.
    ///
    /// A heap-owned `out` grows to fit. A caller-owned `out` receives as much
    /// as its buffer holds and the remainder is reported in
    /// [`Readout::more`]. On failure `out` is unchanged.
    pub fn read_into(&self, out: &mut Yarn) -> SkeinResult<Readout> {
        self.node.check_open("read from")?;
        out.node.check_mutable("read into")?;

        let content = self.body.content();
        let copied = if out.body.caller_owned {
            content.len().min(out.capacity())
        } else {
            out.reserve(content.len(), 0)?;
            content.len()
        };
        out.body.buf[..copied].copy_from_slice(&content[..copied]);
        out.body.fill = copied;
        out.body.form = self.body.form;
        out.node.set_dirty();

        let readout = Readout {
            copied,
            more: content.len() - copied,
        };
        if !readout.is_complete() {
            trace!(copied, more = readout.more, "yarn read truncated");
        }
        Ok(readout)
    }

    // ─── Writing ─────────────────────────────────────────────────────────────

    /// Make room for `needed` bytes, keeping the first `keep` bytes of
    /// content. Nothing changes on failure.
    fn reserve(&mut self, needed: usize, keep: usize) -> SkeinResult<()> {
        let capacity = self.body.capacity();
        if needed <= capacity {
            return Ok(());
        }
        if self.body.caller_owned {
            return Err(SkeinError::OutOfMemory {
                requested: needed,
                available: capacity,
            });
        }

        let target = self.growth.next_capacity(capacity, needed);
        let heap = self.node.heap();
        let mut block = heap.alloc_block(target)?;
        block[..keep].copy_from_slice(&self.body.buf[..keep]);
        let old = mem::replace(&mut self.body.buf, block);
        heap.free_block(old);
        debug!(from = capacity, to = target, "yarn buffer grown");
        Ok(())
    }

    /// Replace the content with `bytes` tagged `form`.
    ///
    /// Grows the buffer through the yarn's heap when needed. On
    /// `OutOfMemory` the previous content is intact.
    pub fn set(&mut self, bytes: &[u8], form: Form) -> SkeinResult<()> {
        self.node.check_mutable("set")?;
        self.reserve(bytes.len(), 0)?;
        self.body.buf[..bytes.len()].copy_from_slice(bytes);
        self.body.fill = bytes.len();
        self.body.form = form;
        self.node.set_dirty();
        Ok(())
    }

    /// Append `bytes` to the content, keeping the current form.
    pub fn append(&mut self, bytes: &[u8]) -> SkeinResult<()> {
        self.node.check_mutable("append to")?;
        let fill = self.body.fill;
        let needed = fill
            .checked_add(bytes.len())
            .ok_or(SkeinError::OutOfMemory {
                requested: usize::MAX,
                available: self.body.capacity(),
            })?;
        self.reserve(needed, fill)?;
        self.body.buf[fill..needed].copy_from_slice(bytes);
        self.body.fill = needed;
        self.node.set_dirty();
        Ok(())
    }

    /// Shorten the content to at most `len` bytes. Capacity is kept.
    pub fn truncate(&mut self, len: usize) -> SkeinResult<()> {
        self.node.check_mutable("truncate")?;
        if len < self.body.fill {
            self.body.fill = len;
            self.node.set_dirty();
        }
        Ok(())
    }

    pub fn clear(&mut self) -> SkeinResult<()> {
        self.truncate(0)
    }

    /// Replace the backing buffer.
    ///
    /// The first `fill` bytes of `buf` become the content. A heap-owned
    /// buffer is charged to the yarn's heap; a caller-owned one is only lent.
    /// A previous heap-owned buffer is released through the heap, and a
    /// previous caller-owned buffer is handed back.
    ///
    /// # Panics
    /// When `fill` exceeds `buf.len()`.
    pub fn set_buffer(
        &mut self,
        buf: Vec<u8>,
        fill: usize,
        form: Form,
        caller_owned: bool,
    ) -> SkeinResult<Option<Vec<u8>>> {
        self.node.check_mutable("set buffer of")?;
        assert!(
            fill <= buf.len(),
            "yarn fill {fill} exceeds buffer capacity {}",
            buf.len()
        );
        if !caller_owned {
            self.node.heap().grant(buf.len())?;
        }
        let old = mem::replace(
            &mut self.body,
            YarnBody {
                buf,
                fill,
                form,
                caller_owned,
            },
        );
        self.node.set_dirty();
        Ok(self.release_body(old))
    }

    /// Hand back a caller-owned buffer, leaving the yarn empty. Returns
    /// `None` when the buffer is heap-owned.
    pub fn reclaim_buffer(&mut self) -> Option<Vec<u8>> {
        if !self.body.caller_owned {
            return None;
        }
        Some(mem::take(&mut self.body).buf)
    }

    /// Free a detached body: heap-owned storage goes back to the heap,
    /// caller-owned storage is returned.
    fn release_body(&self, body: YarnBody) -> Option<Vec<u8>> {
        if body.caller_owned {
            Some(body.buf)
        } else {
            self.node.heap().free_block(body.buf);
            None
        }
    }

    /// Move this yarn's content into `out`.
    ///
    /// When both buffers are heap-owned and come from the same heap, `out`
    /// adopts this yarn's buffer outright and this yarn is left empty.
    /// Otherwise the bytes are copied as by [`Yarn::read_into`].
    pub fn transfer(&mut self, out: &mut Yarn) -> SkeinResult<Transfer> {
        self.node.check_mutable("transfer from")?;
        out.node.check_mutable("transfer into")?;

        let adoptable = !self.body.caller_owned
            && !out.body.caller_owned
            && same_heap(self.node.heap(), out.node.heap());
        if !adoptable {
            return self.read_into(out).map(Transfer::Copied);
        }

        let body = mem::take(&mut self.body);
        let bytes = body.fill;
        let old = mem::replace(&mut out.body, body);
        out.release_body(old);
        self.node.set_dirty();
        out.node.set_dirty();
        trace!(bytes, "yarn buffer adopted");
        Ok(Transfer::Adopted)
    }
}

impl Lifecycle for Yarn {
    fn node(&self) -> &Node {
        &self.node
    }

    fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    /// Release a heap-owned buffer. A caller-owned buffer stays reclaimable.
    fn close_body(&mut self) {
        if self.body.caller_owned {
            return;
        }
        let body = mem::take(&mut self.body);
        let bytes = body.capacity();
        self.release_body(body);
        debug!(bytes, "yarn buffer released");
    }
}
