mod common;

use dmg_emu_core::cartridge::{CartKind, Cartridge, RAM_BANK_SIZE};
use dmg_emu_core::mbc::Mbc;
use dmg_emu_core::mmu::BusDevice;
use dmg_emu_core::rtc::{ManualClock, RTC_DAY_HIGH, RTC_HOURS, RTC_MINUTES, RTC_SECONDS};
use dmg_emu_core::{EmuError, GameBoy};

fn run(gb: &mut GameBoy, steps: usize) {
    for _ in 0..steps {
        gb.dispatch().expect("dispatch");
    }
}

#[test]
fn program_switches_mbc1_rom_bank() {
    let mut rom = common::banked_rom(0x01, 0x02, 0x00);
    // LD A,5 / LD (2000),A / LD A,(4000) / LD (C000),A / JR -2
    let program = [
        0x3E, 0x05, 0xEA, 0x00, 0x20, 0xFA, 0x00, 0x40, 0xEA, 0x00, 0xC0, 0x18, 0xFE,
    ];
    rom[0x100..0x100 + program.len()].copy_from_slice(&program);

    let mut gb = GameBoy::new();
    gb.load_rom(rom).expect("valid rom");
    run(&mut gb, 5);
    assert_eq!(gb.mmu.read_byte(0xC000), 5);
    assert_eq!(gb.mmu.read_byte(0x4000), 5);
}

#[test]
fn battery_ram_survives_export_and_import() {
    let cart = common::banked_cartridge(0x03, 0x02, 0x03);
    assert!(cart.header().has_battery);

    let mut gb = GameBoy::new();
    gb.load_cartridge(cart.clone());
    gb.mmu.write_byte(0x0000, 0x0A);
    gb.mmu.write_byte(0x6000, 0x01);
    gb.mmu.write_byte(0x4000, 0x02);
    gb.mmu.write_byte(0xA123, 0x5A);

    let banks = gb.mmu.cartridge().expect("cartridge").ram_banks();
    assert_eq!(banks.len(), 4);
    assert!(banks.iter().all(|bank| bank.len() == RAM_BANK_SIZE));
    assert_eq!(banks[2][0x123], 0x5A);

    let mut other = GameBoy::new();
    other.load_cartridge(cart);
    other
        .mmu
        .cartridge_mut()
        .expect("cartridge")
        .load_ram_banks(&banks);
    other.mmu.write_byte(0x0000, 0x0A);
    other.mmu.write_byte(0x6000, 0x01);
    other.mmu.write_byte(0x4000, 0x02);
    assert_eq!(other.mmu.read_byte(0xA123), 0x5A);
}

#[test]
fn save_file_round_trip() {
    let cart = common::banked_cartridge(0x1B, 0x03, 0x03);
    let mut mbc = Mbc::new(&cart);
    mbc.write(0x0000, 0x0A);
    mbc.write(0x4000, 0x03);
    mbc.write(0xBFFF, 0xC3);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("game.sav");
    std::fs::write(&path, mbc.ram_banks().concat()).expect("write save");

    let data = std::fs::read(&path).expect("read save");
    assert_eq!(data.len(), 4 * RAM_BANK_SIZE);
    let banks: Vec<Vec<u8>> = data.chunks(RAM_BANK_SIZE).map(<[u8]>::to_vec).collect();
    let mut restored = Mbc::new(&cart);
    restored.load_ram_banks(&banks);
    restored.write(0x0000, 0x0A);
    restored.write(0x4000, 0x03);
    assert_eq!(restored.read(0xBFFF), 0xC3);
}

#[test]
fn disabled_ram_reads_open_bus() {
    let mut mbc = Mbc::new(&common::banked_cartridge(0x1B, 0x03, 0x03));
    assert_eq!(mbc.kind(), CartKind::Mbc5);
    mbc.write(0xA000, 0x12);
    assert_eq!(mbc.read(0xA000), 0xFF);
    mbc.write(0x0000, 0x0A);
    mbc.write(0xA000, 0x12);
    assert_eq!(mbc.read(0xA000), 0x12);
    mbc.write(0x0000, 0x00);
    assert_eq!(mbc.read(0xA000), 0xFF);
}

#[test]
fn mbc2_ram_stores_nibbles() {
    let mut gb = GameBoy::new();
    gb.load_cartridge(common::banked_cartridge(0x06, 0x02, 0x00));
    gb.mmu.write_byte(0x0000, 0x0A);
    gb.mmu.write_byte(0xA010, 0xAB);
    assert_eq!(gb.mmu.read_byte(0xA010), 0xFB);
    // 512 bytes mirrored across the whole window.
    assert_eq!(gb.mmu.read_byte(0xA210), 0xFB);
    assert_eq!(gb.mmu.cartridge().expect("cartridge").ram_bank_count(), 1);
}

fn select_rtc(gb: &mut GameBoy, reg: u8) -> u8 {
    gb.mmu.write_byte(0x4000, reg);
    gb.mmu.read_byte(0xA000)
}

fn latch(gb: &mut GameBoy) {
    gb.mmu.write_byte(0x6000, 0x00);
    gb.mmu.write_byte(0x6000, 0x01);
}

#[test]
fn mbc3_rtc_follows_injected_clock() {
    let clock = ManualClock::new(1_000);
    let handle = clock.clone();
    let mut gb = GameBoy::with_clock(move || Box::new(clock.clone()));
    gb.load_cartridge(common::banked_cartridge(0x10, 0x02, 0x03));
    gb.mmu.write_byte(0x0000, 0x0A);

    handle.advance(3_725);
    assert_eq!(select_rtc(&mut gb, RTC_SECONDS), 0, "not latched yet");
    latch(&mut gb);
    assert_eq!(select_rtc(&mut gb, RTC_SECONDS), 5);
    assert_eq!(select_rtc(&mut gb, RTC_MINUTES), 2);
    assert_eq!(select_rtc(&mut gb, RTC_HOURS), 1);

    // Halted clocks ignore elapsed time.
    gb.mmu.write_byte(0x4000, RTC_DAY_HIGH);
    gb.mmu.write_byte(0xA000, 0x40);
    handle.advance(60);
    latch(&mut gb);
    assert_eq!(select_rtc(&mut gb, RTC_MINUTES), 2);
    assert_eq!(select_rtc(&mut gb, RTC_DAY_HIGH) & 0x40, 0x40);
}

#[test]
fn rtc_reads_without_rtc_chip_are_open_bus() {
    let mut gb = GameBoy::new();
    gb.load_cartridge(common::banked_cartridge(0x13, 0x02, 0x03));
    gb.mmu.write_byte(0x0000, 0x0A);
    assert!(gb.mmu.cartridge().expect("cartridge").rtc().is_none());
    assert_eq!(select_rtc(&mut gb, RTC_SECONDS), 0xFF);
}

#[test]
fn bad_headers_are_reported() {
    let mut rom = common::rom_with_program(&[]);
    rom[0x0147] = 0xFC;
    assert_eq!(
        Cartridge::from_bytes(rom).err(),
        Some(EmuError::UnrecognizedCartridgeType(0xFC))
    );

    let mut rom = common::rom_with_program(&[]);
    rom[0x0148] = 0x20;
    assert_eq!(
        Cartridge::from_bytes(rom).err(),
        Some(EmuError::UnsupportedRomSize(0x20))
    );

    let mut gb = GameBoy::new();
    assert!(gb.load_rom(vec![0; 0x100]).is_err());
    assert!(gb.cartridge().is_none());
}
