// LMDB-backed feature store: one entry per product in each database
use anyhow::Result;
use craftx_core::{FeatureBundle, Product, ProductId, ProductMetadata};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;
use std::sync::Arc;

const DB_BUNDLES: &str = "bundles";
const DB_METADATA: &str = "metadata";

/// Product id -> feature bundle (bincode) and display metadata (JSON).
/// Both records of a product are written in one transaction.
pub struct FeatureStore {
    env: Arc<Env>,
    bundles_db: Database<Str, Bytes>,
    metadata_db: Database<Str, Bytes>,
}

impl FeatureStore {
    pub fn open<P: AsRef<Path>>(path: P, map_size: usize) -> Result<Self> {
        std::fs::create_dir_all(&path)?;

        let env = Arc::new(unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(4)
                .open(path)?
        });

        let mut wtxn = env.write_txn()?;
        let bundles_db = env.create_database(&mut wtxn, Some(DB_BUNDLES))?;
        let metadata_db = env.create_database(&mut wtxn, Some(DB_METADATA))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            bundles_db,
            metadata_db,
        })
    }

    pub fn put_product(&self, id: &ProductId, metadata: &ProductMetadata, bundle: &FeatureBundle) -> Result<()> {
        let bundle_bytes = bincode::serialize(bundle)?;
        let metadata_bytes = serde_json::to_vec(metadata)?;

        let mut wtxn = self.env.write_txn()?;
        self.bundles_db.put(&mut wtxn, id.as_str(), &bundle_bytes)?;
        self.metadata_db.put(&mut wtxn, id.as_str(), &metadata_bytes)?;
        wtxn.commit()?;
        Ok(())
    }

    pub fn put_metadata(&self, id: &ProductId, metadata: &ProductMetadata) -> Result<()> {
        let bytes = serde_json::to_vec(metadata)?;
        let mut wtxn = self.env.write_txn()?;
        self.metadata_db.put(&mut wtxn, id.as_str(), &bytes)?;
        wtxn.commit()?;
        Ok(())
    }

    pub fn get_bundle(&self, id: &ProductId) -> Result<Option<FeatureBundle>> {
        let rtxn = self.env.read_txn()?;
        match self.bundles_db.get(&rtxn, id.as_str())? {
            Some(data) => Ok(Some(bincode::deserialize(data)?)),
            None => Ok(None),
        }
    }

    /// Bundles for several products under one read transaction, in order.
    pub fn get_bundles(&self, ids: &[ProductId]) -> Result<Vec<Option<FeatureBundle>>> {
        let rtxn = self.env.read_txn()?;
        ids.iter()
            .map(|id| -> Result<Option<FeatureBundle>> {
                match self.bundles_db.get(&rtxn, id.as_str())? {
                    Some(data) => Ok(Some(bincode::deserialize(data)?)),
                    None => Ok(None),
                }
            })
            .collect()
    }

    pub fn get_metadata(&self, id: &ProductId) -> Result<Option<ProductMetadata>> {
        let rtxn = self.env.read_txn()?;
        match self.metadata_db.get(&rtxn, id.as_str())? {
            Some(data) => Ok(Some(serde_json::from_slice(data)?)),
            None => Ok(None),
        }
    }

    pub fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let rtxn = self.env.read_txn()?;
        let Some(bundle) = self.bundles_db.get(&rtxn, id.as_str())? else {
            return Ok(None);
        };
        let metadata = match self.metadata_db.get(&rtxn, id.as_str())? {
            Some(data) => serde_json::from_slice(data)?,
            None => ProductMetadata::default(),
        };
        Ok(Some(Product::new(id.clone(), metadata, bincode::deserialize(bundle)?)))
    }

    /// Remove both records of a product. Returns true if a bundle existed.
    pub fn delete_product(&self, id: &ProductId) -> Result<bool> {
        let mut wtxn = self.env.write_txn()?;
        let existed = self.bundles_db.delete(&mut wtxn, id.as_str())?;
        self.metadata_db.delete(&mut wtxn, id.as_str())?;
        wtxn.commit()?;
        Ok(existed)
    }

    pub fn contains(&self, id: &ProductId) -> Result<bool> {
        let rtxn = self.env.read_txn()?;
        Ok(self.bundles_db.get(&rtxn, id.as_str())?.is_some())
    }

    /// Number of stored bundles.
    pub fn len(&self) -> Result<usize> {
        let rtxn = self.env.read_txn()?;
        Ok(self.bundles_db.len(&rtxn)? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Ids with a stored bundle, in key order.
    pub fn product_ids(&self) -> Result<Vec<ProductId>> {
        let rtxn = self.env.read_txn()?;
        let mut ids = Vec::new();
        for result in self.bundles_db.iter(&rtxn)? {
            let (key, _) = result?;
            ids.push(ProductId::from(key));
        }
        Ok(ids)
    }

    /// Every stored product, in key order.
    pub fn products(&self) -> Result<Vec<Product>> {
        let rtxn = self.env.read_txn()?;
        let mut products = Vec::new();
        for result in self.bundles_db.iter(&rtxn)? {
            let (key, data) = result?;
            let metadata = match self.metadata_db.get(&rtxn, key)? {
                Some(meta) => serde_json::from_slice(meta)?,
                None => ProductMetadata::default(),
            };
            products.push(Product::new(ProductId::from(key), metadata, bincode::deserialize(data)?));
        }
        Ok(products)
    }
}
