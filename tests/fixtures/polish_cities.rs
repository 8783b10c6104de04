//! City centre coordinates in Poland.
//!
//! Sourced from OpenStreetMap place nodes.

use route_planner::geo::Coord;

pub const WARSAW: Coord = Coord { lat: 52.2319581, lon: 21.0067249 };
pub const LODZ: Coord = Coord { lat: 51.7687323, lon: 19.4569911 };
pub const RADOM: Coord = Coord { lat: 51.4022557, lon: 21.1541546 };
pub const PLOCK: Coord = Coord { lat: 52.5463446, lon: 19.7065364 };
pub const KRAKOW: Coord = Coord { lat: 50.0619474, lon: 19.9368564 };
pub const GDANSK: Coord = Coord { lat: 54.3482907, lon: 18.6540233 };
pub const POZNAN: Coord = Coord { lat: 52.4082663, lon: 16.9335199 };
pub const WROCLAW: Coord = Coord { lat: 51.1089776, lon: 17.0326689 };
pub const LUBLIN: Coord = Coord { lat: 51.2181960, lon: 22.5547819 };
pub const BIALYSTOK: Coord = Coord { lat: 53.1323, lon: 23.1590 };

/// Delivery stops for a country-wide run, depot excluded.
pub const DELIVERY_STOPS: &[Coord] = &[KRAKOW, GDANSK, POZNAN, WROCLAW, LUBLIN, BIALYSTOK, LODZ];
