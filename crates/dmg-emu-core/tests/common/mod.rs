#![allow(dead_code)]

use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

use dmg_emu_core::cartridge::{Cartridge, ROM_BANK_SIZE};

static INIT: OnceCell<()> = OnceCell::new();

const TEST_ROM_BUNDLE: &str =
    "https://github.com/c-sp/game-boy-test-roms/releases/download/v7.0/game-boy-test-roms-v7.0.zip";
const SM83_VECTORS: &str = "https://raw.githubusercontent.com/SingleStepTests/sm83/main/v1";

fn ensure_test_roms() {
    INIT.get_or_init(|| {
        let dir = roms_dir();
        fs::create_dir_all(&dir).expect("failed to create test_roms directory");
        if dir.join("blargg").exists() {
            return;
        }

        let resp = reqwest::blocking::get(TEST_ROM_BUNDLE).expect("failed to download test roms");
        let status = resp.status();
        if !status.is_success() {
            panic!("failed to download test roms: {status}");
        }
        let bytes = resp.bytes().expect("failed to read rom bytes");
        let reader = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(reader).expect("failed to open zip archive");
        archive.extract(&dir).expect("failed to extract test roms");
    });
}

fn download_file(url: &str, dest: &Path) {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).expect("failed to create destination directory");
    }

    let resp = reqwest::blocking::get(url).expect("failed to download file");
    let status = resp.status();
    if !status.is_success() {
        panic!("failed to download {url}: {status}");
    }

    let bytes = resp.bytes().expect("failed to read response body");
    let tmp = dest.with_extension("tmp");
    fs::write(&tmp, &bytes).expect("failed to write temporary file");
    fs::rename(&tmp, dest).expect("failed to move downloaded file into place");
}

pub fn roms_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("test_roms")
}

pub fn rom_path<P: AsRef<Path>>(relative: P) -> PathBuf {
    ensure_test_roms();
    roms_dir().join(relative)
}

/// Path to the single-step vector file for `name` ("00", "cb 11", ...),
/// fetched on first use.
pub fn sm83_vector_path(name: &str) -> PathBuf {
    let local = roms_dir().join("sm83").join(format!("{}.json", name.replace(' ', "_")));
    if !local.exists() {
        let url = format!("{SM83_VECTORS}/{}.json", name.replace(' ', "%20"));
        download_file(&url, &local);
    }
    local
}

/// A 32 KiB ROM-only image with `program` at the entry point.
pub fn rom_with_program(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 2 * ROM_BANK_SIZE];
    rom[0x100..0x100 + program.len()].copy_from_slice(program);
    rom
}

/// A banked image whose every bank starts with its own index, so reading
/// 0x4000 tells which bank is mapped.
pub fn banked_rom(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    let banks = 2usize << rom_code;
    let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
    for bank in 0..banks {
        rom[bank * ROM_BANK_SIZE] = bank as u8;
        rom[bank * ROM_BANK_SIZE + 1] = (bank >> 8) as u8;
    }
    rom[0x0147] = cart_type;
    rom[0x0148] = rom_code;
    rom[0x0149] = ram_code;
    rom
}

pub fn banked_cartridge(cart_type: u8, rom_code: u8, ram_code: u8) -> Cartridge {
    Cartridge::from_bytes(banked_rom(cart_type, rom_code, ram_code)).expect("valid header")
}

pub fn serial_contains_result(serial: &[u8], checked_up_to: &mut usize) -> bool {
    const PASSED: &[u8] = b"Passed";
    const FAILED: &[u8] = b"Failed";

    let lookbehind = PASSED.len().max(FAILED.len()).saturating_sub(1);
    let start = checked_up_to.saturating_sub(lookbehind).min(serial.len());
    let window = &serial[start..];

    let found = window.windows(PASSED.len()).any(|chunk| chunk == PASSED)
        || window.windows(FAILED.len()).any(|chunk| chunk == FAILED);

    *checked_up_to = serial.len();
    found
}
