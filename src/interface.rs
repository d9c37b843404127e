use crate::engine::timing::{
	FLAG_READ_DELAY,
	COUNT_MASK,
};

pub const BDM_COMMAND_BACKGROUND:    u8 = 0x90;
pub const BDM_COMMAND_READ_STATUS:   u8 = 0xE4;
pub const BDM_COMMAND_WRITE_CONTROL: u8 = 0xC4;
pub const BDM_COMMAND_READ_BYTE:     u8 = 0xE0;
pub const BDM_COMMAND_WRITE_BYTE:    u8 = 0xC0;

/// One command frame for the engine.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Command {
	pub delay_before_read: bool,
	pub write: Vec<u8>,
	pub read_count: u8,
}

impl Command {
	pub fn new(write: &[u8], read_count: u8) -> Self {
		Command {
			delay_before_read: false,
			write: write.to_vec(),
			read_count,
		}
	}

	pub fn with_read_delay(mut self) -> Self {
		self.delay_before_read = true;
		self
	}

	/// Frame bytes: flags, write count, write bytes, read count.
	///
	/// The counts are 3-bit fields on the wire, larger frames are rejected.
	pub fn encode(&self) -> crate::AResult<Vec<u8>> {
		ensure!(self.write.len() <= COUNT_MASK as usize,
			"too many bytes to write in one command: {} (max {})", self.write.len(), COUNT_MASK);
		ensure!(self.read_count <= COUNT_MASK,
			"too many bytes to read in one command: {} (max {})", self.read_count, COUNT_MASK);

		let mut frame = Vec::with_capacity(3 + self.write.len());
		frame.push(if self.delay_before_read { FLAG_READ_DELAY } else { 0 });
		frame.push(self.write.len() as u8);
		frame.extend_from_slice(&self.write);
		frame.push(self.read_count);
		Ok(frame)
	}
}

/// Byte stream to a BDM engine.
pub trait Transport {
	fn write(&mut self, data: &[u8]) -> crate::AResult<()>;
	fn read(&mut self, len: usize) -> crate::AResult<Vec<u8>>;
}

impl<'a, T: ?Sized + Transport> Transport for &'a mut T {
	fn write(&mut self, data: &[u8]) -> crate::AResult<()> {
		T::write(*self, data)
	}

	fn read(&mut self, len: usize) -> crate::AResult<Vec<u8>> {
		T::read(*self, len)
	}
}

/// BDM commands of the target on top of an engine byte stream.
pub struct BdmInterface<T: Transport> {
	lower: T,
}

impl<T: Transport> BdmInterface<T> {
	pub fn new(lower: T) -> Self {
		BdmInterface { lower }
	}

	pub fn execute(&mut self, command: &Command) -> crate::AResult<Vec<u8>> {
		self.lower.write(&command.encode()?)?;
		if command.read_count == 0 {
			return Ok(Vec::new());
		}
		self.lower.read(command.read_count as usize)
	}

	fn read_one(&mut self, command: Command) -> crate::AResult<u8> {
		let data = self.execute(&command)?;
		ensure!(data.len() == 1, "expected one byte, got {}", data.len());
		Ok(data[0])
	}

	/// enter active background mode
	pub fn background(&mut self) -> crate::AResult<()> {
		self.execute(&Command::new(&[BDM_COMMAND_BACKGROUND], 0))?;
		Ok(())
	}

	pub fn read_status(&mut self) -> crate::AResult<u8> {
		self.read_one(Command::new(&[BDM_COMMAND_READ_STATUS], 1).with_read_delay())
	}

	pub fn write_control(&mut self, value: u8) -> crate::AResult<()> {
		self.execute(&Command::new(&[BDM_COMMAND_WRITE_CONTROL, value], 0))?;
		Ok(())
	}

	pub fn read_byte(&mut self, address: u16) -> crate::AResult<u8> {
		let a = address.to_be_bytes();
		let value = self.read_one(Command::new(&[BDM_COMMAND_READ_BYTE, a[0], a[1]], 1).with_read_delay())?;
		trace!("read @{:04x}: {:02x}", address, value);
		Ok(value)
	}

	/// byte by byte, wrapping around at the end of the address space
	pub fn read_bytes(&mut self, address: u16, count: usize) -> crate::AResult<Vec<u8>> {
		let mut result = Vec::with_capacity(count);
		for i in 0..count {
			let a = address.wrapping_add(i as u16);
			result.push(with_context!(("read at 0x{:04x}", a), self.read_byte(a))?);
		}
		Ok(result)
	}

	pub fn write_byte(&mut self, address: u16, value: u8) -> crate::AResult<()> {
		let a = address.to_be_bytes();
		self.execute(&Command::new(&[BDM_COMMAND_WRITE_BYTE, a[0], a[1], value], 0))?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn encode_frames() {
		assert_eq!(Command::new(&[0xAB], 2).encode().unwrap(), vec![0x00, 0x01, 0xAB, 0x02]);
		assert_eq!(
			Command::new(&[BDM_COMMAND_READ_BYTE, 0x12, 0x34], 1).with_read_delay().encode().unwrap(),
			vec![0x01, 0x03, 0xE0, 0x12, 0x34, 0x01],
		);
		assert_eq!(Command::new(&[], 0).encode().unwrap(), vec![0x00, 0x00, 0x00]);
	}

	#[test]
	fn reject_oversized_frames() {
		assert!(Command::new(&[0; 7], 7).encode().is_ok());
		assert!(Command::new(&[0; 8], 0).encode().is_err());
		assert!(Command::new(&[], 8).encode().is_err());
	}

	struct Loopback {
		written: Vec<u8>,
		replies: Vec<u8>,
	}

	impl Transport for Loopback {
		fn write(&mut self, data: &[u8]) -> crate::AResult<()> {
			self.written.extend_from_slice(data);
			Ok(())
		}

		fn read(&mut self, len: usize) -> crate::AResult<Vec<u8>> {
			ensure!(self.replies.len() >= len, "no more replies");
			Ok(self.replies.drain(..len).collect())
		}
	}

	#[test]
	fn read_bytes_wraps_address() {
		let mut lb = Loopback { written: Vec::new(), replies: vec![1, 2] };
		let data = BdmInterface::new(&mut lb).read_bytes(0xFFFF, 2).unwrap();
		assert_eq!(data, vec![1, 2]);
		assert_eq!(lb.written, vec![
			0x01, 0x03, 0xE0, 0xFF, 0xFF, 0x01,
			0x01, 0x03, 0xE0, 0x00, 0x00, 0x01,
		]);
	}

	#[test]
	fn read_errors_carry_address() {
		let mut lb = Loopback { written: Vec::new(), replies: vec![] };
		let err = BdmInterface::new(&mut lb).read_bytes(0x0100, 1).unwrap_err();
		assert!(err.to_string().starts_with("read at 0x0100"), "{}", err);
	}
}
