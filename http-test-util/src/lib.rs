pub mod drain;
pub mod stub;

use bytes::Bytes;
use http_body_util::Full;

#[inline]
pub fn empty_body() -> Full<Bytes> {
    Full::new(Bytes::new())
}

/// One entry of the `/api/kategori` listing served by the stub target.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Category {
    pub id: u32,
    pub nama: String,
    pub harga: u32,
    pub stok: u32,
}

impl Category {
    #[must_use]
    pub fn new(id: u32, nama: &str, harga: u32, stok: u32) -> Self {
        Self {
            id,
            nama: nama.to_string(),
            harga,
            stok,
        }
    }
}

#[must_use]
pub fn seed_categories() -> Vec<Category> {
    vec![
        Category::new(1, "Indomie Godog", 3500, 10),
        Category::new(2, "Vit 1000ml", 3000, 40),
        Category::new(3, "Kecap", 12000, 20),
    ]
}
