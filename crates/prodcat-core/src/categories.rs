//! Product-type code to human-readable category name.

/// Returned for any code outside the table.
pub const UNKNOWN_CATEGORY: &str = "Non défini";

/// The 27 product-type codes of the catalog taxonomy.
pub const CATEGORIES: &[(i64, &str)] = &[
    (10, "Livres et ouvrages culturels"),
    (40, "Jeux vidéo et accessoires"),
    (50, "Accessoires gaming"),
    (60, "Consoles rétro"),
    (1140, "Figurines Pop & licences geek"),
    (1160, "Cartes à collectionner"),
    (1180, "Jeux de figurines & wargames"),
    (1280, "Jouets enfants & bébés"),
    (1281, "Jeux et loisirs enfants"),
    (1300, "Drones et modèles réduits"),
    (1301, "Chaussettes & accessoires enfants"),
    (1302, "Jouets divers & loisirs créatifs"),
    (1320, "Puériculture & équipement bébé"),
    (1560, "Mobilier & articles de maison"),
    (1920, "Linge de maison & décoration textile"),
    (1940, "Alimentation & boissons"),
    (2060, "Décoration & accessoires saisonniers"),
    (2220, "Accessoires pour animaux"),
    (2280, "Magazines & journaux anciens"),
    (2403, "Livres, mangas & partitions"),
    (2462, "Lots jeux vidéo et consoles"),
    (2522, "Fournitures de papeterie"),
    (2582, "Mobilier et accessoires de jardin"),
    (2583, "Accessoires pour piscines et spas"),
    (2585, "Outils et équipements de jardinage"),
    (2705, "Essais & livres d’histoire"),
    (2905, "Jeux PC à télécharger & éditions spéciales"),
];

/// Human-readable name of a Rakuten `prdtypecode`, `None` when the code
/// is not in the table.
pub fn category_name(code: i64) -> Option<&'static str> {
    CATEGORIES
        .binary_search_by_key(&code, |(c, _)| *c)
        .ok()
        .map(|i| CATEGORIES[i].1)
}

/// Like [`category_name`], with [`UNKNOWN_CATEGORY`] for unlisted codes.
pub fn category_or_default(code: i64) -> &'static str {
    category_name(code).unwrap_or(UNKNOWN_CATEGORY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_sorted_and_complete() {
        assert_eq!(CATEGORIES.len(), 27);
        assert!(CATEGORIES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(category_name(2583), Some("Accessoires pour piscines et spas"));
        assert_eq!(category_or_default(10), "Livres et ouvrages culturels");
        assert_eq!(category_or_default(9999), UNKNOWN_CATEGORY);
        assert_eq!(category_name(11), None);
        assert_eq!(category_name(-10), None);
    }
}
