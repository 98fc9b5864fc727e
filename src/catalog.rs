use std::collections::BTreeMap;

/// Maps purchasable kits to the console command that hands them out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KitCatalog {
    kits: BTreeMap<String, String>,
}

const STOCK_KITS: &[(&str, &str)] = &[
    ("Wood Bundle", "give wood 10000"),
    ("Stone Bundle", "give stone 10000"),
    ("Metal Fragments Bundle", "give metal.fragments 10000"),
    ("HQM Bundle", "give metal.refined 1000"),
    ("Cloth Bundle", "give cloth 10000"),
    ("Low Grade Fuel Bundle", "give fuel 1000"),
    ("Scrap Bundle", "give scrap 10000"),
    (
        "Beginners Raiding Kit",
        "give satchel.charge 12; give ammo.explosive 256",
    ),
    (
        "Rookies Rocket Kit",
        "give rocket.launcher 1; give rocket.basic 9",
    ),
    (
        "Rocket Mania Kit",
        "give rocket.launcher 2; give rocket.basic 18; give rocket.hv 6",
    ),
    ("Demolitioner Kit", "give explosive.timed.deployed 6"),
    (
        "Base Breacher",
        "give explosive.timed.deployed 10; give ammo.explosive 384",
    ),
    (
        "Explosive Addicted",
        "give rocket.launcher 3; give rocket.basic 27; give rocket.hv 9; give ammo.explosive 256; give explosive.timed.deployed 8",
    ),
];

impl KitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The kits sold in the store out of the box.
    pub fn stock() -> Self {
        STOCK_KITS.iter().copied().collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, command: impl Into<String>) {
        self.kits.insert(name.into(), command.into());
    }

    /// Exact match first, then ignoring case.
    pub fn command(&self, name: &str) -> Option<&str> {
        self.kits
            .get(name)
            .or_else(|| {
                self.kits
                    .iter()
                    .find(|(kit, _)| kit.eq_ignore_ascii_case(name))
                    .map(|(_, command)| command)
            })
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.kits.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.kits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kits.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KitCatalog {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut catalog = KitCatalog::new();
        catalog.extend(iter);
        catalog
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for KitCatalog {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, command) in iter {
            self.insert(name, command);
        }
    }
}
