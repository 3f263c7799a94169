//! Flower class registry
//!
//! Static table mapping the 0-based class index produced by the network to a
//! display name. The default table holds the 102 Oxford flower categories in
//! the order used by the training labels.

use std::collections::BTreeMap;

/// Total number of classes in the Oxford 102 flowers dataset
pub const NUM_CLASSES: usize = 102;

/// Name returned for an index the registry does not cover
pub const UNKNOWN_CLASS: &str = "Unknown";

/// Class names for the Oxford 102 flowers dataset
pub const FLOWER_NAMES: [&str; NUM_CLASSES] = [
    "pink primrose",
    "hard-leaved pocket orchid",
    "canterbury bells",
    "sweet pea",
    "english marigold",
    "tiger lily",
    "moon orchid",
    "bird of paradise",
    "monkshood",
    "globe thistle",
    "snapdragon",
    "colt's foot",
    "king protea",
    "spear thistle",
    "yellow iris",
    "globe-flower",
    "purple coneflower",
    "peruvian lily",
    "balloon flower",
    "giant white arum lily",
    "fire lily",
    "pincushion flower",
    "fritillary",
    "red ginger",
    "grape hyacinth",
    "corn poppy",
    "prince of wales feathers",
    "stemless gentian",
    "artichoke",
    "sweet william",
    "carnation",
    "garden phlox",
    "love in the mist",
    "mexican aster",
    "alpine sea holly",
    "ruby-lipped cattleya",
    "cape flower",
    "great masterwort",
    "siam tulip",
    "lenten rose",
    "barbeton daisy",
    "daffodil",
    "sword lily",
    "poinsettia",
    "bolero deep blue",
    "wallflower",
    "marigold",
    "buttercup",
    "oxeye daisy",
    "common dandelion",
    "petunia",
    "wild pansy",
    "primula",
    "sunflower",
    "pelargonium",
    "bishop of llandaff",
    "gaura",
    "geranium",
    "orange dahlia",
    "pink-yellow dahlia",
    "cautleya spicata",
    "japanese anemone",
    "black-eyed susan",
    "silverbush",
    "californian poppy",
    "osteospermum",
    "spring crocus",
    "bearded iris",
    "windflower",
    "tree poppy",
    "gazania",
    "azalea",
    "water lily",
    "rose",
    "thorn apple",
    "morning glory",
    "passion flower",
    "lotus",
    "toad lily",
    "anthurium",
    "frangipani",
    "clematis",
    "hibiscus",
    "columbine",
    "desert-rose",
    "tree mallow",
    "magnolia",
    "cyclamen",
    "watercress",
    "canna lily",
    "hippeastrum",
    "bee balm",
    "ball moss",
    "foxglove",
    "bougainvillea",
    "camellia",
    "mallow",
    "mexican petunia",
    "bromelia",
    "blanket flower",
    "trumpet creeper",
    "blackberry lily",
];

/// Ordered, immutable index -> name table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRegistry {
    names: Vec<String>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::flowers()
    }
}

impl ClassRegistry {
    /// The 102 Oxford flower categories
    pub fn flowers() -> Self {
        Self::from_names(FLOWER_NAMES)
    }

    /// Build a registry from names listed in class-index order
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Display name of `index`, if the registry covers it
    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Display name of `index`, or `"Unknown"` past the end of the table
    pub fn name(&self, index: usize) -> &str {
        self.get(index).unwrap_or(UNKNOWN_CLASS)
    }

    pub fn total_classes(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index -> name map, ordered by index
    pub fn as_map(&self) -> BTreeMap<usize, String> {
        self.names.iter().cloned().enumerate().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_flower_table() {
        let registry = ClassRegistry::flowers();
        assert_eq!(registry.total_classes(), 102);
        assert_eq!(registry.name(0), "pink primrose");
        assert_eq!(registry.name(73), "rose");
        assert_eq!(registry.name(101), "blackberry lily");
    }

    #[test]
    fn test_names_are_unique() {
        let unique: HashSet<_> = FLOWER_NAMES.iter().collect();
        assert_eq!(unique.len(), NUM_CLASSES);
    }

    #[test]
    fn test_out_of_range_is_unknown() {
        let registry = ClassRegistry::from_names(["a", "b"]);
        assert_eq!(registry.get(2), None);
        assert_eq!(registry.name(2), UNKNOWN_CLASS);
        assert_eq!(registry.name(1), "b");
    }

    #[test]
    fn test_as_map_is_ordered() {
        let map = ClassRegistry::flowers().as_map();
        assert_eq!(map.len(), 102);
        let keys: Vec<_> = map.keys().copied().collect();
        assert_eq!(keys, (0..102).collect::<Vec<_>>());
        assert_eq!(map[&50], "petunia");
    }
}
