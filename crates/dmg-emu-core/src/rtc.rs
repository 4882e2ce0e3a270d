//! MBC3 real-time clock.
//!
//! The clock chip counts wall time, so it is the one source of
//! non-determinism in the core. Time is read through [`RtcClock`], which
//! defaults to [`SystemClock`] and can be swapped for a [`ManualClock`] when a
//! test needs reproducible values.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of whole seconds since an arbitrary, fixed epoch.
pub trait RtcClock: Send {
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl RtcClock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// A clock that only moves when told to. Clones share the same counter.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    seconds: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            seconds: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn advance(&self, seconds: u64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, seconds: u64) {
        self.seconds.store(seconds, Ordering::SeqCst);
    }
}

impl RtcClock for ManualClock {
    fn now(&self) -> u64 {
        self.seconds.load(Ordering::SeqCst)
    }
}

pub const RTC_SECONDS: u8 = 0x08;
pub const RTC_MINUTES: u8 = 0x09;
pub const RTC_HOURS: u8 = 0x0A;
pub const RTC_DAY_LOW: u8 = 0x0B;
pub const RTC_DAY_HIGH: u8 = 0x0C;

const DAY_HIGH_BIT: u8 = 0x01;
const HALT_BIT: u8 = 0x40;
const CARRY_BIT: u8 = 0x80;
const MAX_DAYS: u16 = 0x01FF;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtcRegisters {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub days: u16,
    pub halt: bool,
    pub carry: bool,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & DAY_HIGH_BIT;
        if self.halt {
            out |= HALT_BIT;
        }
        if self.carry {
            out |= CARRY_BIT;
        }
        out
    }

    fn read(&self, reg: u8) -> u8 {
        match reg {
            RTC_SECONDS => self.seconds & 0x3F,
            RTC_MINUTES => self.minutes & 0x3F,
            RTC_HOURS => self.hours & 0x1F,
            RTC_DAY_LOW => (self.days & 0x00FF) as u8,
            RTC_DAY_HIGH => self.control_byte(),
            _ => 0xFF,
        }
    }
}

pub struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    clock: Box<dyn RtcClock>,
    last_sync: u64,
}

impl std::fmt::Debug for Rtc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rtc")
            .field("regs", &self.regs)
            .field("latched", &self.latched)
            .field("last_sync", &self.last_sync)
            .finish()
    }
}

impl Rtc {
    pub fn new(clock: Box<dyn RtcClock>) -> Self {
        let last_sync = clock.now();
        Self {
            regs: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            clock,
            last_sync,
        }
    }

    /// Zero the counters and restart timing from the current instant.
    pub fn reset(&mut self) {
        self.regs = RtcRegisters::default();
        self.latched = self.regs;
        self.last_sync = self.clock.now();
    }

    /// Copy the live counters into the snapshot visible to the game.
    pub fn latch(&mut self) {
        self.sync();
        self.latched = self.regs;
    }

    pub fn read_latched(&self, reg: u8) -> u8 {
        self.latched.read(reg)
    }

    pub fn live(&self) -> RtcRegisters {
        self.regs
    }

    pub fn write_register(&mut self, reg: u8, value: u8) {
        self.sync();
        match reg {
            RTC_SECONDS => self.regs.seconds = value & 0x3F,
            RTC_MINUTES => self.regs.minutes = value & 0x3F,
            RTC_HOURS => self.regs.hours = value & 0x1F,
            RTC_DAY_LOW => self.regs.days = (self.regs.days & 0x0100) | value as u16,
            RTC_DAY_HIGH => {
                self.regs.days =
                    (self.regs.days & 0x00FF) | (((value & DAY_HIGH_BIT) as u16) << 8);
                self.regs.halt = value & HALT_BIT != 0;
                self.regs.carry = value & CARRY_BIT != 0;
            }
            _ => {}
        }
        self.latched = self.regs;
    }

    fn sync(&mut self) {
        let now = self.clock.now();
        let elapsed = now.saturating_sub(self.last_sync);
        self.last_sync = now;
        if !self.regs.halt && elapsed > 0 {
            self.advance_seconds(elapsed);
        }
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        while seconds > 0 {
            let until_minute_tick = self.seconds_until_minute_tick();
            if seconds < until_minute_tick {
                self.regs.seconds = ((self.regs.seconds as u64 + seconds) & 0x3F) as u8;
                return;
            }

            seconds -= until_minute_tick;
            self.regs.seconds = 0;
            self.minute_tick();
        }
    }

    // Counters written with out-of-range values keep counting until they wrap
    // at their bit width before the carry into the next unit happens.
    fn seconds_until_minute_tick(&self) -> u64 {
        let sec = self.regs.seconds as u64;
        if sec <= 59 { 60 - sec } else { (64 - sec) + 60 }
    }

    fn minute_tick(&mut self) {
        let overflow = self.regs.minutes == 59;
        self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        if overflow {
            self.regs.minutes = 0;
            self.hour_tick();
        }
    }

    fn hour_tick(&mut self) {
        let overflow = self.regs.hours == 23;
        self.regs.hours = (self.regs.hours + 1) & 0x1F;
        if overflow {
            self.regs.hours = 0;
            self.day_tick();
        }
    }

    fn day_tick(&mut self) {
        if self.regs.days >= MAX_DAYS {
            self.regs.days = 0;
            self.regs.carry = true;
        } else {
            self.regs.days += 1;
        }
    }
}
