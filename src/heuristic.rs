use rand::Rng;

/// Rule-driven fallback pricing. Always produces a `"$<integer>"` price for
/// any description, with no external calls; used when neither the
/// marketplace nor the LLM yields a usable figure.
///
/// The rule tables are ordered and first-match-wins. Later entries are
/// deliberately unreachable once an earlier one matches ("new" masks "used"
/// when both appear); keep the order intact. Premium keywords use plain
/// substring containment, a known source of generous matches ("pro" hits
/// "professional") that existing price output depends on.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub base_price: f64,
    pub premium_keywords: &'static [&'static str],
    pub premium_multiplier: f64,
    pub age_decay_factor: f64,
}

/// The terminal General rule has no keywords and always matches.
pub static CATEGORY_RULES: [CategoryRule; 12] = [
    CategoryRule {
        name: "Electronics",
        keywords: &[
            "iphone", "phone", "laptop", "macbook", "computer", "tablet", "ipad",
            "television", "tv", "monitor", "camera", "headphone", "earbud", "speaker",
            "console", "xbox", "playstation", "nintendo", "drone", "smartwatch",
        ],
        base_price: 150.0,
        premium_keywords: &[
            "iphone", "macbook", "pro", "max", "ultra", "oled", "gaming", "apple",
        ],
        premium_multiplier: 2.5,
        age_decay_factor: 0.7,
    },
    CategoryRule {
        name: "Appliances",
        keywords: &[
            "refrigerator", "fridge", "washer", "dryer", "dishwasher", "microwave",
            "oven", "stove", "freezer", "vacuum", "blender", "air fryer",
        ],
        base_price: 120.0,
        premium_keywords: &["stainless", "smart", "dyson", "kitchenaid", "counter depth"],
        premium_multiplier: 1.8,
        age_decay_factor: 0.75,
    },
    CategoryRule {
        name: "Furniture",
        keywords: &[
            "couch", "sofa", "sectional", "table", "chair", "desk", "dresser",
            "bookshelf", "cabinet", "bed frame", "nightstand", "ottoman",
        ],
        base_price: 90.0,
        premium_keywords: &["leather", "solid wood", "oak", "walnut", "mid-century"],
        premium_multiplier: 2.0,
        age_decay_factor: 0.8,
    },
    CategoryRule {
        name: "Sports & Outdoors",
        keywords: &[
            "bike", "bicycle", "treadmill", "elliptical", "kayak", "golf", "skis",
            "snowboard", "tent", "dumbbell", "weight bench", "scooter",
        ],
        base_price: 80.0,
        premium_keywords: &["carbon", "trek", "specialized", "peloton", "full suspension"],
        premium_multiplier: 2.2,
        age_decay_factor: 0.8,
    },
    CategoryRule {
        name: "Tools",
        keywords: &[
            "drill", "saw", "sander", "grinder", "wrench", "toolbox", "mower",
            "trimmer", "generator", "compressor", "pressure washer",
        ],
        base_price: 70.0,
        premium_keywords: &["dewalt", "milwaukee", "makita", "cordless", "brushless"],
        premium_multiplier: 1.9,
        age_decay_factor: 0.85,
    },
    CategoryRule {
        name: "Musical Instruments",
        keywords: &[
            "guitar", "piano", "keyboard", "drum", "violin", "cello", "amplifier",
            "amp", "ukulele", "saxophone", "trumpet",
        ],
        base_price: 110.0,
        premium_keywords: &["fender", "gibson", "yamaha", "vintage tone", "tube"],
        premium_multiplier: 2.3,
        age_decay_factor: 0.85,
    },
    CategoryRule {
        name: "Jewelry",
        keywords: &[
            "ring", "necklace", "bracelet", "earring", "pendant", "watch", "jewelry",
            "brooch",
        ],
        base_price: 60.0,
        premium_keywords: &["gold", "diamond", "sterling", "platinum", "rolex", "omega"],
        premium_multiplier: 3.0,
        age_decay_factor: 0.9,
    },
    CategoryRule {
        name: "Collectibles",
        keywords: &[
            "collectible", "trading card", "figurine", "coin", "stamp", "comic",
            "memorabilia", "antique", "action figure", "model kit",
        ],
        base_price: 40.0,
        premium_keywords: &["rare", "limited", "first edition", "graded", "sealed"],
        premium_multiplier: 2.5,
        age_decay_factor: 0.95,
    },
    CategoryRule {
        name: "Clothing & Accessories",
        keywords: &[
            "jacket", "coat", "shoes", "sneaker", "boot", "dress", "jeans", "handbag",
            "purse", "backpack", "sunglasses", "belt",
        ],
        base_price: 35.0,
        premium_keywords: &["leather", "designer", "nike", "jordan", "north face"],
        premium_multiplier: 2.0,
        age_decay_factor: 0.8,
    },
    CategoryRule {
        name: "Toys & Games",
        keywords: &[
            "lego", "toy", "doll", "puzzle", "board game", "stroller", "crib",
            "playset", "plush",
        ],
        base_price: 30.0,
        premium_keywords: &["lego", "collector", "complete set", "retired set"],
        premium_multiplier: 1.8,
        age_decay_factor: 0.8,
    },
    CategoryRule {
        name: "Books & Media",
        keywords: &[
            "book", "textbook", "vinyl", "record", "dvd", "blu-ray", "boxed set",
            "magazine",
        ],
        base_price: 15.0,
        premium_keywords: &["signed", "first edition", "first printing", "box set"],
        premium_multiplier: 2.2,
        age_decay_factor: 0.9,
    },
    CategoryRule {
        name: "General",
        keywords: &[],
        base_price: 45.0,
        premium_keywords: &[],
        premium_multiplier: 1.0,
        age_decay_factor: 0.8,
    },
];

// Condition keywords checked in this order; the first matching group wins.
const CONDITION_RULES: [(&[&str], f64); 5] = [
    (&["new", "sealed", "unopened"], 1.6),
    (&["like new", "excellent"], 1.35),
    (&["good"], 1.05),
    (&["fair", "used"], 0.75),
    (&["poor", "damaged", "broken"], 0.35),
];

// Categories where a vintage/antique/retro mention appreciates rather than
// depreciates the item.
const APPRECIATING_CATEGORIES: [&str; 3] = ["Collectibles", "Furniture", "Jewelry"];
const VINTAGE_KEYWORDS: [&str; 3] = ["vintage", "antique", "retro"];

/// First category rule whose keyword set matches the lowercased text.
pub fn classify(text: &str) -> &'static CategoryRule {
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.keywords.is_empty() || rule.keywords.iter().any(|kw| text.contains(kw)))
        .unwrap_or(&CATEGORY_RULES[CATEGORY_RULES.len() - 1])
}

fn condition_multiplier(text: &str) -> f64 {
    for (keywords, multiplier) in CONDITION_RULES {
        if keywords.iter().any(|kw| text.contains(kw)) {
            return multiplier;
        }
    }
    1.0
}

fn age_multiplier(text: &str, decay: f64) -> f64 {
    let mentions_any = |years: &[&str]| years.iter().any(|y| text.contains(y));
    if text.contains("new") || mentions_any(&["2023", "2024"]) {
        1.25
    } else if mentions_any(&["2020", "2021", "2022"]) {
        1.0
    } else if mentions_any(&["2018", "2019"]) {
        decay
    } else if mentions_any(&["2015", "2016", "2017"]) {
        decay * 0.8
    } else if (2000..=2014).any(|year: i32| text.contains(&year.to_string())) {
        decay * 0.6
    } else {
        1.0
    }
}

fn vintage_boost(rule: &CategoryRule, text: &str) -> f64 {
    let appreciating = APPRECIATING_CATEGORIES.contains(&rule.name);
    if appreciating && VINTAGE_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        2.0
    } else {
        1.0
    }
}

/// Round to a human denomination keyed on magnitude.
fn round_natural(value: f64) -> i64 {
    let step = if value > 1000.0 {
        100.0
    } else if value > 200.0 {
        50.0
    } else if value > 50.0 {
        10.0
    } else {
        5.0
    };
    let rounded = (value / step).round() * step;
    rounded.max(5.0) as i64
}

/// Price before jitter and rounding, split out so the bounded-randomization
/// contract stays testable.
fn unjittered_price(text: &str) -> f64 {
    let rule = classify(text);
    let mut price = rule.base_price;
    if rule.premium_keywords.iter().any(|kw| text.contains(kw)) {
        price *= rule.premium_multiplier;
    }
    price *= condition_multiplier(text);
    price *= age_multiplier(text, rule.age_decay_factor);
    price *= vintage_boost(rule, text);
    price
}

/// Deterministic modulo an explicit jitter step: the same description yields
/// a slightly different quote each call, bounded to [0.85, 1.15] of the rule
/// price, floored at $5.
pub fn generate_price(description: &str) -> String {
    let text = description.to_lowercase();
    let mut rng = rand::rng();
    let jittered = unjittered_price(&text) * rng.random_range(0.85..=1.15);
    format!("${}", round_natural(jittered.max(5.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_dollars(price: &str) -> i64 {
        assert!(price.starts_with('$'), "price not dollar-prefixed: {price}");
        price[1..].parse().expect("price digits")
    }

    #[test]
    fn classify_first_match_wins() {
        assert_eq!(classify("old iphone with cracked screen").name, "Electronics");
        assert_eq!(classify("solid oak table").name, "Furniture");
        assert_eq!(classify("random mystery box").name, "General");
        // "leather jacket" hits Clothing before General
        assert_eq!(classify("leather jacket").name, "Clothing & Accessories");
    }

    #[test]
    fn condition_precedence_is_fixed() {
        assert_eq!(condition_multiplier("sealed in box"), 1.6);
        // "like new" contains "new", so the first group masks the second
        assert_eq!(condition_multiplier("like new"), 1.6);
        assert_eq!(condition_multiplier("excellent shape"), 1.35);
        assert_eq!(condition_multiplier("good condition"), 1.05);
        assert_eq!(condition_multiplier("well used"), 0.75);
        assert_eq!(condition_multiplier("screen is broken"), 0.35);
        assert_eq!(condition_multiplier("no hints here"), 1.0);
    }

    #[test]
    fn age_bands() {
        assert_eq!(age_multiplier("bought new", 0.7), 1.25);
        assert_eq!(age_multiplier("2024 model", 0.7), 1.25);
        assert_eq!(age_multiplier("from 2021", 0.7), 1.0);
        assert_eq!(age_multiplier("2019 release", 0.7), 0.7);
        assert!((age_multiplier("2016 model year", 0.7) - 0.56).abs() < 1e-9);
        assert!((age_multiplier("circa 2007", 0.7) - 0.42).abs() < 1e-9);
        assert_eq!(age_multiplier("no year given", 0.7), 1.0);
    }

    #[test]
    fn vintage_boost_only_for_appreciating_categories() {
        assert_eq!(unjittered_price("vintage oak table"), 90.0 * 2.0 * 2.0);
        // vintage electronics depreciate like anything else
        let price = unjittered_price("vintage camera");
        assert_eq!(price, 150.0);
    }

    #[test]
    fn always_formats_with_minimum_floor() {
        for description in ["", "junk drawer odds and ends", "broken old dvd from 2003"] {
            let price = generate_price(description);
            assert!(parse_dollars(&price) >= 5, "floor violated: {price}");
        }
    }

    #[test]
    fn iphone_new_lands_in_jitter_bounds() {
        // base 150 * premium 2.5 * new 1.6 * recent 1.25 = 750,
        // jitter [0.85, 1.15] then nearest-$50 rounding
        assert_eq!(unjittered_price("iphone 14 new"), 750.0);
        for _ in 0..50 {
            let value = parse_dollars(&generate_price("iphone 14 new"));
            assert!(
                (650..=850).contains(&value) && value % 50 == 0,
                "out of bounds: {value}"
            );
        }
    }

    #[test]
    fn rounding_steps_by_magnitude() {
        assert_eq!(round_natural(1240.0), 1200);
        assert_eq!(round_natural(1251.0), 1300);
        assert_eq!(round_natural(260.0), 250);
        assert_eq!(round_natural(74.0), 70);
        assert_eq!(round_natural(37.0), 35);
        assert_eq!(round_natural(3.0), 5);
    }
}
