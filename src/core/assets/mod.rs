mod asset_index;

pub use asset_index::{link_assets, AssetIndex, AssetLayout, AssetObject, RESOURCES_URL};
