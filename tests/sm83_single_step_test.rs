//! Runs the public per-opcode SM83 JSON test vectors (the same
//! `initial`/`final`/`cycles` shape used by the other CPU back ends' single
//! step tests) when a vector directory is available, and prints a notice and
//! skips otherwise rather than failing the build.
//!
//! Point `SM83_TEST_VECTORS` at a checkout of the public SingleStepTests
//! `GameboyCPUTests/v2` directory (one JSON file per opcode, `cb <hex>.json`
//! for the CB-prefixed table) to exercise this.

use std::collections::BTreeSet;
use std::path::PathBuf;

use dmg_core::cartridge::Cartridge;
use dmg_core::cpu::Cpu;
use dmg_core::memory::MemoryBus;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct CpuState {
    pc: u16,
    sp: u16,
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    f: u8,
    h: u8,
    l: u8,
    ime: u8,
    #[serde(default)]
    ie: Option<u8>,
    ram: Vec<(u16, u8)>,
}

#[derive(Debug, Clone, Deserialize)]
struct TestCase {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    final_state: CpuState,
    cycles: Vec<(Option<u16>, Option<u8>, String)>,
}

fn flat_cartridge() -> Cartridge {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0147] = 0x00;
    rom[0x0148] = 0x00;
    rom[0x0149] = 0x00;
    Cartridge::new(&rom).unwrap()
}

fn load_state(cpu: &mut Cpu, bus: &mut MemoryBus, s: &CpuState) {
    cpu.a = s.a;
    cpu.f = s.f & 0xF0;
    cpu.b = s.b;
    cpu.c = s.c;
    cpu.d = s.d;
    cpu.e = s.e;
    cpu.h = s.h;
    cpu.l = s.l;
    cpu.sp = s.sp;
    cpu.pc = s.pc;
    cpu.ime = s.ime != 0;
    if let Some(ie) = s.ie {
        bus.interrupts.ie = ie;
    }
    for &(addr, val) in &s.ram {
        bus.write(addr, val);
    }
}

fn run_test_case(tc: &TestCase) -> Option<String> {
    let mut cpu = Cpu::new();
    let mut bus = MemoryBus::new(flat_cartridge(), None);

    load_state(&mut cpu, &mut bus, &tc.initial);

    let mut total_ticks = 0;
    loop {
        total_ticks += 1;
        match cpu.step(&mut bus) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => return Some(format!("{}: {}", tc.name, e)),
        }
        if total_ticks > 200 {
            return Some(format!("{}: instruction did not complete in 200 cycles", tc.name));
        }
    }

    let fs = &tc.final_state;
    macro_rules! check {
        ($got:expr, $exp:expr, $field:expr) => {
            if $got != $exp {
                return Some(format!(
                    "{}: {} (got 0x{:X} exp 0x{:X})",
                    tc.name, $field, $got as u64, $exp as u64
                ));
            }
        };
    }
    check!(cpu.a, fs.a, "A");
    check!(cpu.f, fs.f & 0xF0, "F");
    check!(cpu.b, fs.b, "B");
    check!(cpu.c, fs.c, "C");
    check!(cpu.d, fs.d, "D");
    check!(cpu.e, fs.e, "E");
    check!(cpu.h, fs.h, "H");
    check!(cpu.l, fs.l, "L");
    check!(cpu.sp, fs.sp, "SP");
    check!(cpu.pc, fs.pc, "PC");
    check!(cpu.ime as u8, fs.ime, "IME");

    for &(addr, expected) in &fs.ram {
        let got = bus.read(addr);
        if got != expected {
            return Some(format!(
                "{}: RAM[0x{:04X}] (got 0x{:02X} exp 0x{:02X})",
                tc.name, addr, got, expected
            ));
        }
    }

    if total_ticks != tc.cycles.len() {
        return Some(format!(
            "{}: cycles (got {} exp {})",
            tc.name, total_ticks, tc.cycles.len()
        ));
    }

    None
}

#[test]
fn sm83_opcode_vectors() {
    let Ok(dir) = std::env::var("SM83_TEST_VECTORS") else {
        eprintln!(
            "SM83_TEST_VECTORS is not set; skipping the opcode conformance sweep. \
             Point it at a directory of SingleStepTests-format JSON files to run it."
        );
        return;
    };
    let test_dir = PathBuf::from(dir);
    if !test_dir.exists() {
        eprintln!(
            "SM83_TEST_VECTORS points at a path that does not exist; skipping the \
             opcode conformance sweep."
        );
        return;
    }

    let mut entries: Vec<_> = std::fs::read_dir(&test_dir)
        .expect("failed to read SM83_TEST_VECTORS directory")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut total_tests = 0;
    let mut failed_tests = 0;
    let mut failed_files = BTreeSet::new();
    let mut first_failures: Vec<String> = Vec::new();

    for entry in &entries {
        let filename = entry.file_name().to_string_lossy().to_string();
        let json = std::fs::read_to_string(entry.path()).expect("failed to read vector file");
        let tests: Vec<TestCase> = match serde_json::from_str(&json) {
            Ok(tests) => tests,
            Err(_) => continue, // not every file in the sweep is opcode vectors (e.g. a README)
        };

        for tc in &tests {
            if let Some(err) = run_test_case(tc) {
                failed_tests += 1;
                if !failed_files.contains(&filename) && first_failures.len() < 50 {
                    first_failures.push(err);
                }
                failed_files.insert(filename.clone());
            }
        }
        total_tests += tests.len();
    }

    eprintln!(
        "SM83 opcode vectors: {} passed, {} failed across {} files",
        total_tests - failed_tests,
        failed_tests,
        entries.len()
    );
    if !first_failures.is_empty() {
        eprintln!("First failure per file ({} files):", failed_files.len());
        for err in &first_failures {
            eprintln!("  {}", err);
        }
    }
    assert_eq!(failed_tests, 0, "{} opcode vector failures", failed_tests);
}
