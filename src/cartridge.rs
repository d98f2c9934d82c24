use crate::error::{EmulatorError, EmulatorErrorKind};

const HEADER_MIN_LEN: usize = 0x0150;
const CARTRIDGE_TYPE_OFFSET: usize = 0x0147;
const ROM_SIZE_OFFSET: usize = 0x0148;
const RAM_SIZE_OFFSET: usize = 0x0149;

const ROM_BANK_LEN: usize = 0x4000;
const RAM_BANK_LEN: usize = 0x2000;

/// ROM/RAM buffers plus the MBC1 bank-select latch. The bus owns this
/// directly; the latch fields are plain indices into the two flat backing
/// buffers rather than arrays of bank pointers.
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rom_banks: usize,
    ram_banks: usize,
    has_ram: bool,

    rom_bank_low5: u8,
    /// The shared 2-bit secondary bank register: upper ROM-bank bits in
    /// mode 0, RAM-bank select in mode 1. Real MBC1 hardware has exactly
    /// one such register for both purposes -- writes at 0x4000..0x5FFF
    /// always land here regardless of mode, and switching mode does not
    /// clear it, which is what makes the bank-0 relocation quirk in mode 1
    /// observable.
    bank2: u8,
    mode: bool,
    ram_enabled: bool,
}

impl Cartridge {
    pub fn new(rom: &[u8]) -> Result<Cartridge, EmulatorError> {
        if rom.len() < HEADER_MIN_LEN {
            return Err(EmulatorError::new(
                EmulatorErrorKind::Io,
                format!("rom image too small: {} bytes", rom.len()),
            ));
        }

        let cart_type = rom[CARTRIDGE_TYPE_OFFSET];
        if !matches!(cart_type, 0x00 | 0x01 | 0x02 | 0x03) {
            return Err(EmulatorError::new(
                EmulatorErrorKind::Io,
                format!("unsupported cartridge type {:#04x}", cart_type),
            ));
        }
        let has_ram = matches!(cart_type, 0x02 | 0x03);

        let rom_size_code = rom[ROM_SIZE_OFFSET];
        if rom_size_code > 8 {
            return Err(EmulatorError::new(
                EmulatorErrorKind::Io,
                format!("unsupported rom size code {:#04x}", rom_size_code),
            ));
        }
        let rom_banks = 2usize << rom_size_code;
        let rom_len = rom_banks * ROM_BANK_LEN;
        if rom.len() < rom_len {
            return Err(EmulatorError::new(
                EmulatorErrorKind::Io,
                format!(
                    "rom image shorter than declared size: have {}, need {}",
                    rom.len(),
                    rom_len
                ),
            ));
        }

        let ram_size_code = rom[RAM_SIZE_OFFSET];
        let ram_banks = match ram_size_code {
            0 => 0,
            1 => 1,
            2 => 1,
            3 => 4,
            4 => 16,
            5 => 8,
            other => {
                return Err(EmulatorError::new(
                    EmulatorErrorKind::Io,
                    format!("unsupported ram size code {:#04x}", other),
                ));
            }
        };

        let mut rom_buf = rom[..rom_len].to_vec();
        // Pad in case the caller handed us exactly rom_len bytes and nothing more.
        rom_buf.resize(rom_len, 0xFF);

        Ok(Cartridge {
            rom: rom_buf,
            ram: vec![0; ram_banks * RAM_BANK_LEN],
            rom_banks,
            ram_banks,
            has_ram,
            rom_bank_low5: 1,
            bank2: 0,
            mode: false,
            ram_enabled: false,
        })
    }

    fn rom_bank_number(&self) -> usize {
        let low5 = if self.rom_bank_low5 == 0 {
            1
        } else {
            self.rom_bank_low5
        };
        let bank = if self.mode {
            low5 as usize
        } else {
            (low5 as usize) | ((self.bank2 as usize) << 5)
        };
        bank % self.rom_banks.max(1)
    }

    fn ram_bank_number(&self) -> usize {
        if self.mode {
            self.bank2 as usize % self.ram_banks.max(1)
        } else {
            0
        }
    }

    pub fn read_rom0(&self, addr: u16) -> u8 {
        let bank0 = if self.mode {
            ((self.bank2 as usize) << 5) % self.rom_banks.max(1)
        } else {
            0
        };
        self.rom[bank0 * ROM_BANK_LEN + addr as usize]
    }

    pub fn read_rom_x(&self, addr: u16) -> u8 {
        let bank = self.rom_bank_number();
        self.rom[bank * ROM_BANK_LEN + (addr as usize - 0x4000)]
    }

    pub fn write_mbc_register(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enabled = value & 0x0F == 0x0A,
            0x2000..=0x3FFF => self.rom_bank_low5 = value & 0x1F,
            0x4000..=0x5FFF => self.bank2 = value & 0x03,
            0x6000..=0x7FFF => self.mode = value & 1 != 0,
            _ => {}
        }
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.ram_enabled || !self.has_ram || self.ram_banks == 0 {
            return 0xFF;
        }
        let bank = self.ram_bank_number();
        self.ram[bank * RAM_BANK_LEN + (addr as usize - 0xA000)]
    }

    pub fn write_ram(&mut self, addr: u16, value: u8) {
        if !self.ram_enabled || !self.has_ram || self.ram_banks == 0 {
            return;
        }
        let bank = self.ram_bank_number();
        self.ram[bank * RAM_BANK_LEN + (addr as usize - 0xA000)] = value;
    }

    pub fn ram_enabled(&self) -> bool {
        self.ram_enabled && self.has_ram
    }

    /// Whether the cartridge declares any external RAM banks at all, used by
    /// the bus to distinguish "RAM present but latched off" (reads 0xFF,
    /// normal) from "no RAM physically present" (a structural error).
    pub fn has_ram_banks(&self) -> bool {
        self.has_ram && self.ram_banks > 0
    }

    /// Flat view of persisted cartridge RAM, exposed for the host to save.
    pub fn external_ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn external_ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }
}
