use std::fmt::Write;

use super::AxiError;

/// Zero-initialized, bounds-checked byte store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    data: Vec<u8>,
}

impl MemoryRegion {
    pub fn new(size: usize) -> Self {
        MemoryRegion { data: vec![0; size] }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn range(&self, address: u64, length: usize) -> Result<std::ops::Range<usize>, AxiError> {
        let out_of_range = AxiError::OutOfRange {
            address,
            length,
            size: self.data.len(),
        };
        let start = usize::try_from(address).map_err(|_| out_of_range.clone())?;
        match start.checked_add(length) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(out_of_range),
        }
    }

    pub fn read(&self, address: u64, length: usize) -> Result<Vec<u8>, AxiError> {
        let range = self.range(address, length)?;
        Ok(self.data[range].to_vec())
    }

    pub fn write(&mut self, address: u64, data: &[u8]) -> Result<(), AxiError> {
        let range = self.range(address, data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    /// Writes the lanes of `word` selected by `strb` to the word at `address`.
    pub fn write_strobed(&mut self, address: u64, word: u64, strb: u8, width: usize) -> Result<(), AxiError> {
        let range = self.range(address, width)?;
        for (lane, byte) in self.data[range].iter_mut().enumerate() {
            if strb & (1 << lane) != 0 {
                *byte = (word >> (8 * lane)) as u8;
            }
        }
        Ok(())
    }

    pub fn read_word(&self, address: u64, width: usize) -> Result<u64, AxiError> {
        let bytes = self.read(address, width)?;
        Ok(bytes
            .iter()
            .enumerate()
            .fold(0, |acc, (lane, b)| acc | ((*b as u64) << (8 * lane))))
    }

    /// Classic 16 bytes per line dump of `length` bytes from `address`.
    pub fn hexdump(&self, address: u64, length: usize, prefix: &str) -> Result<String, AxiError> {
        let bytes = self.read(address, length)?;
        let mut out = String::new();
        for (i, line) in bytes.chunks(16).enumerate() {
            let _ = write!(out, "{}{:08x}:", prefix, address as usize + 16 * i);
            for b in line {
                let _ = write!(out, " {:02x}", b);
            }
            let pad = 3 * (16 - line.len()) + 2;
            out.push_str(&" ".repeat(pad));
            out.extend(line.iter().map(|b| match b.is_ascii_graphic() {
                true => *b as char,
                false => '.',
            }));
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_bytes_read_zero() {
        let mut m = MemoryRegion::new(16);
        m.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(m.read(2, 4).unwrap(), vec![0, 0, 1, 2]);
        assert_eq!(m.read_word(4, 4).unwrap(), 0x0403_0201);
    }

    #[test]
    fn out_of_range_is_local_error() {
        let mut m = MemoryRegion::new(8);
        assert_eq!(
            m.write(6, &[0; 4]),
            Err(AxiError::OutOfRange {
                address: 6,
                length: 4,
                size: 8
            })
        );
        assert!(m.read(u64::MAX, 1).is_err());
        // nothing was written
        assert_eq!(m.read(0, 8).unwrap(), vec![0; 8]);
    }

    #[test]
    fn strobes_select_lanes() {
        let mut m = MemoryRegion::new(8);
        m.write_strobed(4, 0xaabb_ccdd, 0b0101, 4).unwrap();
        assert_eq!(m.read(4, 4).unwrap(), vec![0xdd, 0, 0xbb, 0]);
    }

    #[test]
    fn hexdump_format() {
        let mut m = MemoryRegion::new(32);
        m.write(16, b"AXI!").unwrap();
        let dump = m.hexdump(16, 4, "RAM_").unwrap();
        assert!(dump.starts_with("RAM_00000010: 41 58 49 21"));
        assert!(dump.trim_end().ends_with("AXI!"));
    }
}
