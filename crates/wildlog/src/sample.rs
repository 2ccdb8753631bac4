//! Demo content for a fresh logbook.
//!
//! Produces a year of synthetic sightings for five Seattle-area species, with
//! monthly frequencies following a hand-authored seasonal curve per species.

use chrono::NaiveDate;
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::observation::{date_to_timestamp, new_id, Observation};

/// Year used for sample sightings unless configured otherwise.
pub const DEFAULT_SAMPLE_YEAR: i32 = 2023;

/// One species with its seasonal curve and the notes it draws from.
#[derive(Debug)]
struct SpeciesProfile {
    name: &'static str,
    /// Base sightings per month, January first.
    curve: [u32; 12],
    notes: &'static [&'static str],
}

const LOCATIONS: &[&str] = &[
    "Woodland Park, 47.6688, -122.3463",
    "Lake Washington, 47.6097, -122.2559",
    "Discovery Park, 47.6612, -122.4060",
    "Magnuson Park, 47.6795, -122.2568",
    "Green Lake, 47.6806, -122.3294",
    "Carkeek Park, 47.7125, -122.3782",
    "Union Bay Natural Area, 47.6565, -122.2946",
    "Seward Park, 47.5508, -122.2649",
    "Ravenna Park, 47.6717, -122.3063",
    "Washington Park Arboretum, 47.6359, -122.2944",
    "Golden Gardens, 47.6917, -122.4019",
    "Lincoln Park, 47.5305, -122.3961",
    "Volunteer Park, 47.6301, -122.3158",
    "Interlaken Park, 47.6342, -122.3073",
];

const PROFILES: &[SpeciesProfile] = &[
    SpeciesProfile {
        name: "Red Fox",
        curve: [1, 2, 3, 4, 2, 1, 0, 0, 1, 3, 4, 3],
        notes: &[
            "Spotted at dawn, hunting near the edge of the forest.",
            "With cubs, playing in a meadow.",
            "Crossing a path with prey in its mouth.",
            "Hunting voles in the tall grass.",
            "Cubs playing outside den entrance.",
            "Adult teaching cubs to hunt.",
            "Carrying prey back to den site.",
            "Marking territory at dawn.",
            "Hunting near Japanese Garden.",
            "Beautiful winter coat, hunting at dusk.",
            "Pouncing on prey beneath snow.",
        ],
    },
    SpeciesProfile {
        name: "Great Blue Heron",
        curve: [1, 2, 3, 4, 3, 3, 2, 4, 4, 3, 2, 1],
        notes: &[
            "Standing in shallow water, very still, waiting for fish.",
            "Fishing in the shallows, caught a small fish.",
            "Standing on one leg at the edge of the pond.",
            "Nesting in the tall trees with several others.",
            "Juvenile learning to fish in shallow water.",
            "Flying with large fish in its beak.",
            "Territorial display with another heron.",
            "Preening feathers on log.",
            "Hunting in tidal pools at low tide.",
            "Stoic in light snowfall, still fishing.",
        ],
    },
    SpeciesProfile {
        name: "Bald Eagle",
        curve: [1, 3, 4, 3, 2, 1, 1, 2, 3, 4, 5, 2],
        notes: &[
            "Perched on a tall Douglas fir, scanning the water.",
            "Pair of eagles soaring over the lake.",
            "Spotted carrying nesting material.",
            "Feeding young in the nest.",
            "Young eagle practicing flight.",
            "Perched on snag overlooking the lake.",
            "Diving for fish near the lighthouse.",
            "Harassing osprey to steal fish.",
            "Pair calling to each other across the bay.",
            "Soaring over snow-covered landscape.",
        ],
    },
    SpeciesProfile {
        name: "Raccoon",
        curve: [2, 2, 3, 4, 2, 2, 4, 2, 1, 2, 4, 3],
        notes: &[
            "Family of raccoons foraging near the water's edge at dusk.",
            "Washing food in the creek.",
            "Climbing trees near the amphitheater.",
            "Family group foraging along the creek.",
            "Raiding trash cans near the Asian Art Museum.",
            "Sleeping in tree hollow during daytime.",
            "Gathering food before winter.",
            "Preparing winter den in hollow tree.",
            "Tracks in fresh snow leading to den.",
            "Mother with young kits exploring near the conservatory.",
        ],
    },
    SpeciesProfile {
        name: "Coyote",
        curve: [2, 5, 4, 3, 2, 1, 2, 3, 4, 2, 1, 3],
        notes: &[
            "Lone coyote trotting along a trail in the early morning.",
            "Hunting in the tall grass at sunset.",
            "Pack of three hunting together at dusk.",
            "Howling at dusk near the meadow.",
            "Resting in shade during hot afternoon.",
            "Chasing small rodents in field.",
            "Pack of four moving through forest edge.",
            "Lone individual with thick winter coat.",
            "Howling in moonlight on winter solstice.",
        ],
    },
];

/// Names of the species the generator draws from.
#[must_use]
pub fn sample_species() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.name).collect()
}

/// Generate a year of sample sightings.
///
/// For each month and species the base frequency is nudged by -1..=1 (never
/// below one) and then multiplied by 0..=2, so some combinations legitimately
/// produce no sightings. The result is in generation order, not sorted.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, year: i32) -> Vec<Observation> {
    let mut observations = Vec::new();

    for month in 1..=12u32 {
        let Some(days) = days_in_month(year, month) else {
            continue;
        };

        for profile in PROFILES {
            let base = profile.curve[(month - 1) as usize];
            let nudged = base.saturating_add_signed(rng.random_range(-1..=1)).max(1);
            let count = nudged * rng.random_range(0..=2);

            for _ in 0..count {
                let day = rng.random_range(1..=days);
                let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                    continue;
                };
                let location = LOCATIONS.choose(rng).copied().unwrap_or_default();
                let notes = profile.notes.choose(rng).copied().unwrap_or_default();

                observations.push(Observation {
                    id: new_id(),
                    species: profile.name.to_string(),
                    location: location.to_string(),
                    date,
                    notes: notes.to_string(),
                    photo: None,
                    timestamp: date_to_timestamp(date),
                });
            }
        }
    }

    observations
}

/// Generate a year of sample sightings with the thread-local RNG.
#[must_use]
pub fn generate_sample_data(year: i32) -> Vec<Observation> {
    generate(&mut rand::rng(), year)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from((next - first).num_days()).ok()
}
