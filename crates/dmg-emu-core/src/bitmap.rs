/// One of the four DMG grey levels, darkest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Shade {
    #[default]
    Dark = 0,
    Medium = 1,
    Light = 2,
    White = 3,
}

impl Shade {
    /// Map a 2-bit palette register value to its shade. Value 0 is the
    /// lightest.
    pub fn from_palette_value(value: u8) -> Self {
        match value & 0x03 {
            0 => Shade::White,
            1 => Shade::Light,
            2 => Shade::Medium,
            _ => Shade::Dark,
        }
    }

    /// An 8-bit grey level, handy for dumping frames as images.
    pub fn luminance(self) -> u8 {
        match self {
            Shade::Dark => 0x00,
            Shade::Medium => 0x55,
            Shade::Light => 0xAA,
            Shade::White => 0xFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PaletteGroup {
    #[default]
    Background = 0,
    Object0 = 1,
    Object1 = 2,
}

/// A pixel: the palette it was drawn through and the resulting shade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Colour {
    pub group: PaletteGroup,
    pub shade: Shade,
}

impl Colour {
    pub const BACKGROUND_WHITE: Colour = Colour::new(PaletteGroup::Background, Shade::White);

    pub const fn new(group: PaletteGroup, shade: Shade) -> Self {
        Self { group, shade }
    }

    /// Packed form, `group * 4 + shade`.
    pub fn to_byte(self) -> u8 {
        (self.group as u8) * 4 + self.shade as u8
    }
}

/// A fixed-size grid of palette-tagged pixels. Coordinates outside the grid
/// never panic: reads give the default colour and writes are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    pixels: Vec<Colour>,
}

impl Bitmap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Colour::default(); width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    pub fn get(&self, x: usize, y: usize) -> Colour {
        self.index(x, y)
            .map(|i| self.pixels[i])
            .unwrap_or_default()
    }

    pub fn set(&mut self, x: usize, y: usize, colour: Colour) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = colour;
        }
    }

    pub fn fill(&mut self, colour: Colour) {
        self.pixels.fill(colour);
    }

    pub fn pixels(&self) -> &[Colour] {
        &self.pixels
    }

    /// One scanline, or an empty slice past the bottom edge.
    pub fn row(&self, y: usize) -> &[Colour] {
        if y < self.height {
            &self.pixels[y * self.width..(y + 1) * self.width]
        } else {
            &[]
        }
    }

    pub(crate) fn row_mut(&mut self, y: usize) -> &mut [Colour] {
        if y < self.height {
            &mut self.pixels[y * self.width..(y + 1) * self.width]
        } else {
            &mut []
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_reads_dark_background() {
        let mut bmp = Bitmap::new(4, 2);
        bmp.fill(Colour::BACKGROUND_WHITE);
        assert_eq!(bmp.get(4, 0), Colour::new(PaletteGroup::Background, Shade::Dark));
        assert_eq!(bmp.get(0, 2), Colour::default());
        assert_eq!(bmp.get(3, 1), Colour::BACKGROUND_WHITE);
    }

    #[test]
    fn out_of_bounds_writes_are_dropped() {
        let mut bmp = Bitmap::new(2, 2);
        let red = Colour::new(PaletteGroup::Object1, Shade::Medium);
        bmp.set(2, 0, red);
        bmp.set(0, 5, red);
        assert!(bmp.pixels().iter().all(|&c| c == Colour::default()));

        bmp.set(1, 1, red);
        assert_eq!(bmp.row(1), &[Colour::default(), red]);
        assert!(bmp.row(2).is_empty());
    }

    #[test]
    fn palette_values_map_light_to_dark() {
        let shades: Vec<Shade> = (0..4).map(Shade::from_palette_value).collect();
        assert_eq!(
            shades,
            [Shade::White, Shade::Light, Shade::Medium, Shade::Dark]
        );
        assert_eq!(
            Colour::new(PaletteGroup::Object0, Shade::Light).to_byte(),
            6
        );
    }
}
