//! Startup-loaded data (DataRegistry).
//! Load once, then pass via Arc to the optimizer and the simulation workers. Nothing in here is
//! mutated after construction, so concurrent runs read it without locking.

use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::conflict::{ConflictEncoder, TokenCache};
use crate::data::catalog::CourseCatalog;
use crate::data::z_table::ZScoreTable;
use crate::error::DataError;
use crate::pricing::PriceModel;

#[derive(Debug)]
pub struct DataRegistry {
    catalog: Arc<CourseCatalog>,
    tokens: Arc<TokenCache>,
    prices: PriceModel,
}

impl DataRegistry {
    /// Load the catalog and z-score table named in `settings`.
    pub fn load(settings: &Settings) -> Result<Arc<DataRegistry>, DataError> {
        let catalog =
            CourseCatalog::load_with(&settings.courses_path, &settings.course_id_mapping)?;
        let z_table = ZScoreTable::load(&settings.z_table_path)?;
        Ok(Arc::new(Self::from_parts(catalog, z_table, settings)))
    }

    /// Assemble from already-loaded parts. Tokens for every course are computed here, once.
    pub fn from_parts(catalog: CourseCatalog, z_table: ZScoreTable, settings: &Settings) -> Self {
        let encoder = ConflictEncoder::new(settings.encoder.clone());
        let tokens = TokenCache::build(catalog.courses(), &encoder);
        if z_table.rows() < catalog.len() {
            info!(
                rows = z_table.rows(),
                courses = catalog.len(),
                "z-score table is shorter than the catalog; some courses cannot be priced"
            );
        }
        let prices = PriceModel::new(Arc::new(z_table))
            .with_start_of_index(settings.start_of_index)
            .with_ceiling(settings.price_ceiling);

        Self {
            catalog: Arc::new(catalog),
            tokens: Arc::new(tokens),
            prices,
        }
    }

    pub fn catalog(&self) -> &Arc<CourseCatalog> {
        &self.catalog
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    pub fn price_model(&self) -> &PriceModel {
        &self.prices
    }
}
