use domains::Coordinates;

/// Axis-aligned bounding box used to fit the map to a route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: Coordinates,
    pub north_east: Coordinates,
}

impl Bounds {
    /// `None` for an empty input.
    pub fn of<'a>(coordinates: impl IntoIterator<Item = &'a Coordinates>) -> Option<Bounds> {
        let mut iter = coordinates.into_iter();
        let first = *iter.next()?;
        let (mut south, mut west, mut north, mut east) = (first.lat(), first.lng(), first.lat(), first.lng());
        for c in iter {
            south = south.min(c.lat());
            north = north.max(c.lat());
            west = west.min(c.lng());
            east = east.max(c.lng());
        }
        Some(Bounds {
            south_west: Coordinates::new(south, west).ok()?,
            north_east: Coordinates::new(north, east).ok()?,
        })
    }

    pub fn center(&self) -> Coordinates {
        self.south_west.midpoint(&self.north_east)
    }

    pub fn contains(&self, c: &Coordinates) -> bool {
        (self.south_west.lat()..=self.north_east.lat()).contains(&c.lat())
            && (self.south_west.lng()..=self.north_east.lng()).contains(&c.lng())
    }
}
