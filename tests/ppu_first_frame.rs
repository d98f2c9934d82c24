//! Drawing a single uniform tile across the background and letting a whole
//! frame elapse should leave every visible pixel at the same palette-mapped
//! color index.

mod common;

use common::emulator_with_program;
use dmg_core::ppu::SCREEN_WIDTH;

#[test]
fn a_uniform_tile_fills_the_top_scanline_after_one_frame() {
    let mut emu = emulator_with_program(&[0x00]);

    // Tile 0: every row pairs 0xFF/0xFF, so every pixel decodes to color
    // index 3 (low bit 1, high bit 1).
    for row in 0..8u16 {
        emu.bus.write(0x8000 + row * 2, 0xFF);
        emu.bus.write(0x8000 + row * 2 + 1, 0xFF);
    }
    // Tile map at 0x9800 defaults to all-zero bytes, i.e. every map entry
    // already points at tile 0.

    emu.bus.write(0xFF47, 0xE4); // BGP: identity mapping
    emu.bus.write(0xFF40, 0x91); // LCDC: display on, BG on, 0x8000 tile data

    for _ in 0..70224u32 {
        emu.tick().unwrap();
    }

    let fb = emu.framebuffer();
    for x in 0..SCREEN_WIDTH {
        assert_eq!(fb[x], 3, "pixel {x} on the top scanline was not color index 3");
    }
}
