use std::io::{Read, Write};

use log::debug;

use crate::mmu::BusDevice;

const SB: u16 = 0xFF01;
const SC: u16 = 0xFF02;
const SC_START: u8 = 0x80;
const SC_INTERNAL_CLOCK: u8 = 0x01;

pub trait LinkPort: Send {
    /// Transfer a byte over the link. Returns the byte received from the
    /// partner.
    fn transfer(&mut self, byte: u8) -> u8;
}

/// A stub link port used when no cable is attached.
/// By default incoming bits are all 1, so any transfer receives 0xFF. When
/// `loopback` is true the sent byte is echoed back instead.
#[derive(Debug, Default)]
pub struct NullLinkPort {
    loopback: bool,
}

impl NullLinkPort {
    pub fn new(loopback: bool) -> Self {
        Self { loopback }
    }
}

impl LinkPort for NullLinkPort {
    fn transfer(&mut self, byte: u8) -> u8 {
        if self.loopback { byte } else { 0xFF }
    }
}

/// Link port backed by a pair of byte streams. Every outgoing byte is written
/// and flushed to `writer`, then one byte is read back from `reader`. A
/// closed or failing reader yields 0xFF, like an unplugged cable.
pub struct StreamLinkPort<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> StreamLinkPort<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R, W> LinkPort for StreamLinkPort<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    fn transfer(&mut self, byte: u8) -> u8 {
        if let Err(e) = self.writer.write_all(&[byte]).and_then(|_| self.writer.flush()) {
            debug!("Serial writer failed: {e}");
        }
        let mut buf = [0u8; 1];
        match self.reader.read(&mut buf) {
            Ok(1) => buf[0],
            Ok(_) => 0xFF,
            Err(e) => {
                debug!("Serial reader failed: {e}");
                0xFF
            }
        }
    }
}

/// The SB/SC register pair. Internally clocked transfers complete as soon as
/// they are started; externally clocked ones wait for a partner that never
/// drives the clock, so they stay pending.
pub struct Serial {
    sb: u8,
    sc: u8,
    out_buf: Vec<u8>,
    port: Box<dyn LinkPort>,
    irq_pending: bool,
}

impl Serial {
    pub fn new() -> Self {
        Self {
            sb: 0,
            sc: 0,
            out_buf: Vec::new(),
            port: Box::new(NullLinkPort::default()),
            irq_pending: false,
        }
    }

    pub fn connect(&mut self, port: Box<dyn LinkPort>) {
        self.port = port;
    }

    /// Bytes sent by the game since the last call, in order.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }

    pub fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.irq_pending)
    }

    fn start_transfer(&mut self) {
        let outgoing = self.sb;
        self.sb = self.port.transfer(outgoing);
        self.out_buf.push(outgoing);
        self.sc &= !SC_START;
        self.irq_pending = true;
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for Serial {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            SB => self.sb,
            SC => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            SB => self.sb = val,
            SC => {
                self.sc = val;
                if val & (SC_START | SC_INTERNAL_CLOCK) == SC_START | SC_INTERNAL_CLOCK {
                    self.start_transfer();
                }
            }
            _ => {}
        }
    }

    /// Registers and the output log are cleared; the attached port stays.
    fn reset(&mut self) {
        self.sb = 0;
        self.sc = 0;
        self.out_buf.clear();
        self.irq_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FixedInLinkPort {
        ret: u8,
    }

    impl LinkPort for FixedInLinkPort {
        fn transfer(&mut self, _byte: u8) -> u8 {
            self.ret
        }
    }

    #[test]
    fn internal_clock_transfer_completes_and_requests_irq() {
        let mut serial = Serial::new();
        serial.connect(Box::new(FixedInLinkPort { ret: 0x34 }));

        serial.write(SB, 0x12);
        serial.write(SC, 0x81);

        assert_eq!(serial.read(SB), 0x34);
        assert_eq!(serial.read(SC) & 0x80, 0);
        assert!(serial.take_interrupt());
        assert!(!serial.take_interrupt());
        assert_eq!(serial.take_output(), vec![0x12]);
        assert!(serial.peek_output().is_empty());
    }

    #[test]
    fn external_clock_stays_pending() {
        let mut serial = Serial::new();
        serial.write(SB, 0x55);
        serial.write(SC, 0x80);
        assert_eq!(serial.read(SC), 0xFE);
        assert_eq!(serial.read(SB), 0x55);
        assert!(!serial.take_interrupt());
        assert!(serial.peek_output().is_empty());
    }

    #[test]
    fn open_bus_receives_ff() {
        let mut serial = Serial::new();
        serial.write(SB, 0x41);
        serial.write(SC, 0x81);
        assert_eq!(serial.read(SB), 0xFF);
    }

    #[test]
    fn loopback_echoes() {
        let mut serial = Serial::new();
        serial.connect(Box::new(NullLinkPort::new(true)));
        serial.write(SB, 0x41);
        serial.write(SC, 0x81);
        assert_eq!(serial.read(SB), 0x41);
    }

    #[test]
    fn stream_port_writes_then_reads() {
        let mut port = StreamLinkPort::new(Cursor::new(vec![0x99]), Vec::new());
        assert_eq!(port.transfer(b'P'), 0x99);
        assert_eq!(port.transfer(b'!'), 0xFF);
        let (_, written) = port.into_inner();
        assert_eq!(written, b"P!");
    }

    #[test]
    fn reset_keeps_port() {
        let mut serial = Serial::new();
        serial.connect(Box::new(FixedInLinkPort { ret: 0x01 }));
        serial.write(SB, 0x02);
        serial.write(SC, 0x81);
        serial.reset();
        assert_eq!(serial.read(SB), 0);
        assert!(serial.peek_output().is_empty());
        assert!(!serial.take_interrupt());

        serial.write(SC, 0x81);
        assert_eq!(serial.read(SB), 0x01);
    }
}
