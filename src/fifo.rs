use std::collections::VecDeque;

/// Command stream as seen by the engine (host -> engine).
pub trait ByteSource {
	/// whether `pop` would return a byte
	fn readable(&self) -> bool;
	fn pop(&mut self) -> Option<u8>;
}

/// Response stream as seen by the engine (engine -> host).
pub trait ByteSink {
	/// whether `push` would accept a byte
	fn writable(&self) -> bool;
	/// returns false (and drops nothing) when full
	fn push(&mut self, byte: u8) -> bool;
}

/// Bounded byte FIFO.
#[derive(Clone, Debug)]
pub struct Fifo {
	buf: VecDeque<u8>,
	capacity: usize,
}

impl Fifo {
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0);
		Fifo {
			buf: VecDeque::with_capacity(capacity),
			capacity,
		}
	}

	pub fn len(&self) -> usize {
		self.buf.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	pub fn space(&self) -> usize {
		self.capacity - self.buf.len()
	}

	/// append as many bytes as fit; returns number of bytes taken
	pub fn extend_from_slice(&mut self, data: &[u8]) -> usize {
		let n = data.len().min(self.space());
		self.buf.extend(&data[..n]);
		n
	}

	/// remove up to `max` bytes from the front
	pub fn drain_front(&mut self, max: usize) -> Vec<u8> {
		let n = max.min(self.buf.len());
		self.buf.drain(..n).collect()
	}

	pub fn clear(&mut self) {
		self.buf.clear();
	}
}

impl ByteSource for Fifo {
	fn readable(&self) -> bool {
		!self.buf.is_empty()
	}

	fn pop(&mut self) -> Option<u8> {
		self.buf.pop_front()
	}
}

impl ByteSink for Fifo {
	fn writable(&self) -> bool {
		self.buf.len() < self.capacity
	}

	fn push(&mut self, byte: u8) -> bool {
		if !self.writable() {
			return false;
		}
		self.buf.push_back(byte);
		true
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bounded() {
		let mut f = Fifo::new(2);
		assert!(f.push(1));
		assert!(f.push(2));
		assert!(!f.writable());
		assert!(!f.push(3));
		assert_eq!(f.pop(), Some(1));
		assert_eq!(f.extend_from_slice(&[4, 5, 6]), 1);
		assert_eq!(f.drain_front(8), vec![2, 4]);
		assert!(!f.readable());
		assert_eq!(f.pop(), None);
	}
}
