//! Emprise d'analyse et découpage en tuiles

use geo::{coord, Point, Polygon, Rect};

use crate::BgfaError;

/// Rectangle géographique (degrés WGS84)
///
/// Invariant: `min_lon < max_lon` et `min_lat < max_lat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl Region {
    /// Construit une emprise en validant ses bornes
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, BgfaError> {
        let values = [min_lon, min_lat, max_lon, max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BgfaError::InvalidRegion(format!(
                "non-finite bounds {:?}",
                values
            )));
        }
        if min_lon >= max_lon {
            return Err(BgfaError::InvalidRegion(format!(
                "min_lon ({}) must be lower than max_lon ({})",
                min_lon, max_lon
            )));
        }
        if min_lat >= max_lat {
            return Err(BgfaError::InvalidRegion(format!(
                "min_lat ({}) must be lower than max_lat ({})",
                min_lat, max_lat
            )));
        }
        if min_lon < -180.0 || max_lon > 180.0 || min_lat < -90.0 || max_lat > 90.0 {
            return Err(BgfaError::InvalidRegion(format!(
                "bounds {:?} outside WGS84 range",
                values
            )));
        }

        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// Vrai si le point est dans l'emprise (bords inclus)
    pub fn contains(&self, point: Point) -> bool {
        point.x() >= self.min_lon
            && point.x() <= self.max_lon
            && point.y() >= self.min_lat
            && point.y() <= self.max_lat
    }

    /// Vrai si les deux rectangles se touchent ou se recouvrent
    pub fn intersects(&self, other: &Region) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    /// Vrai si le rectangle englobant `rect` touche l'emprise
    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        self.min_lon <= rect.max().x
            && rect.min().x <= self.max_lon
            && self.min_lat <= rect.max().y
            && rect.min().y <= self.max_lat
    }

    pub fn to_polygon(&self) -> Polygon {
        Rect::new(
            coord! { x: self.min_lon, y: self.min_lat },
            coord! { x: self.max_lon, y: self.max_lat },
        )
        .to_polygon()
    }

    /// Découpe l'emprise en une grille `splits_x` × `splits_y`
    ///
    /// Les tuiles sont ordonnées par colonne (x) puis par ligne (y).
    /// Les bords est/nord d'une tuile ne sont fermés que sur le bord de l'emprise,
    /// si bien qu'un centroïde posé sur une ligne interne n'appartient qu'à une tuile.
    pub fn split(&self, splits_x: u32, splits_y: u32) -> Result<Vec<Tile>, BgfaError> {
        if splits_x == 0 || splits_y == 0 {
            return Err(BgfaError::InvalidRegion(format!(
                "cannot split into {}x{} tiles",
                splits_x, splits_y
            )));
        }

        let x_step = (self.max_lon - self.min_lon) / splits_x as f64;
        let y_step = (self.max_lat - self.min_lat) / splits_y as f64;

        let mut tiles = Vec::with_capacity((splits_x * splits_y) as usize);
        for i in 0..splits_x {
            for j in 0..splits_y {
                let closed_east = i + 1 == splits_x;
                let closed_north = j + 1 == splits_y;

                // Le dernier pas reprend la borne exacte pour éviter les trous d'arrondi
                let x1 = self.min_lon + i as f64 * x_step;
                let x2 = if closed_east {
                    self.max_lon
                } else {
                    self.min_lon + (i + 1) as f64 * x_step
                };
                let y1 = self.min_lat + j as f64 * y_step;
                let y2 = if closed_north {
                    self.max_lat
                } else {
                    self.min_lat + (j + 1) as f64 * y_step
                };

                tiles.push(Tile {
                    index: tiles.len(),
                    region: Region::new(x1, y1, x2, y2)?,
                    closed_east,
                    closed_north,
                });
            }
        }

        Ok(tiles)
    }
}

/// Sous-emprise traitée comme une unité de travail
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    /// Position dans la grille (sert au nom de l'export)
    pub index: usize,
    pub region: Region,
    /// Le bord est appartient à la tuile
    pub closed_east: bool,
    /// Le bord nord appartient à la tuile
    pub closed_north: bool,
}

impl Tile {
    /// Tuile unique couvrant toute l'emprise
    pub fn whole(region: Region) -> Self {
        Self {
            index: 0,
            region,
            closed_east: true,
            closed_north: true,
        }
    }

    /// Vrai si le point appartient à cette tuile (ouverte à l'est/au nord sauf en bordure)
    pub fn owns(&self, point: Point) -> bool {
        let r = &self.region;
        let x_ok = point.x() >= r.min_lon
            && (point.x() < r.max_lon || (self.closed_east && point.x() == r.max_lon));
        let y_ok = point.y() >= r.min_lat
            && (point.y() < r.max_lat || (self.closed_north && point.y() == r.max_lat));
        x_ok && y_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::BoundingRect;

    fn pune() -> Region {
        Region::new(73.85, 18.52, 73.86, 18.53).unwrap()
    }

    #[test]
    fn test_region_validation() {
        assert!(Region::new(73.86, 18.52, 73.85, 18.53).is_err());
        assert!(Region::new(73.85, 18.53, 73.86, 18.53).is_err());
        assert!(Region::new(f64::NAN, 18.52, 73.86, 18.53).is_err());
        assert!(Region::new(-181.0, 0.0, 10.0, 1.0).is_err());
        assert!(Region::new(73.85, 18.52, 73.86, 18.53).is_ok());
    }

    #[test]
    fn test_contains_inclusive() {
        let region = pune();
        assert!(region.contains(Point::new(73.85, 18.52)));
        assert!(region.contains(Point::new(73.86, 18.53)));
        assert!(region.contains(Point::new(73.855, 18.525)));
        assert!(!region.contains(Point::new(73.8601, 18.525)));
    }

    #[test]
    fn test_intersects_touching_and_disjoint() {
        let region = pune();
        let east = Region::new(73.86, 18.52, 73.87, 18.53).unwrap();
        let far = Region::new(74.0, 19.0, 74.1, 19.1).unwrap();
        assert!(region.intersects(&east));
        assert!(east.intersects(&region));
        assert!(!region.intersects(&far));
    }

    #[test]
    fn test_to_polygon_matches_bounds() {
        let polygon = pune().to_polygon();
        assert_eq!(polygon.exterior().0.len(), 5);
        let rect = polygon.bounding_rect().unwrap();
        assert_eq!(rect.min(), coord! { x: 73.85, y: 18.52 });
        assert_eq!(rect.max(), coord! { x: 73.86, y: 18.53 });
    }

    #[test]
    fn test_split_grid_order_and_bounds() {
        let tiles = pune().split(4, 4).unwrap();
        assert_eq!(tiles.len(), 16);

        // Ordre x puis y
        assert_eq!(tiles[0].region.min_lon(), 73.85);
        assert_eq!(tiles[0].region.min_lat(), 18.52);
        assert!((tiles[1].region.min_lat() - 18.5225).abs() < 1e-9);
        assert!((tiles[4].region.min_lon() - 73.8525).abs() < 1e-9);

        // Les bords extérieurs sont repris exactement
        let last = tiles.last().unwrap();
        assert_eq!(last.region.max_lon(), 73.86);
        assert_eq!(last.region.max_lat(), 18.53);
        assert!(last.closed_east && last.closed_north);

        for (i, tile) in tiles.iter().enumerate() {
            assert_eq!(tile.index, i);
        }
    }

    #[test]
    fn test_split_zero_rejected() {
        assert!(pune().split(0, 2).is_err());
    }

    #[test]
    fn test_internal_edge_owned_once() {
        let tiles = pune().split(2, 2).unwrap();
        let on_edge = Point::new(73.855, 18.525);
        let owners = tiles.iter().filter(|t| t.owns(on_edge)).count();
        assert_eq!(owners, 1);

        let corner = Point::new(73.86, 18.53);
        let owners = tiles.iter().filter(|t| t.owns(corner)).count();
        assert_eq!(owners, 1);
    }

    #[test]
    fn test_whole_tile_owns_region() {
        let tile = Tile::whole(pune());
        assert!(tile.owns(Point::new(73.86, 18.53)));
        assert!(tile.owns(Point::new(73.85, 18.52)));
        assert!(!tile.owns(Point::new(73.84, 18.52)));
    }
}
