//! Ontology repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};

use taxon_core::{
    Concept, EmbeddedType, Error, ExtractionTemplate, Layer, Mixin, OntologyRepository,
    PropertyDef, Relationship, Result,
};

const CONCEPT_COLUMNS: &str = "id, label, description, layer, inherits, is_abstract, synonyms, \
     mixins, properties, relationships, extraction_template, pillar";

/// PostgreSQL implementation of OntologyRepository.
pub struct PgOntologyRepository {
    pool: Pool<Postgres>,
}

impl PgOntologyRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_concept_row(row: &PgRow) -> Result<Concept> {
        let level: i16 = row.get("layer");
        let layer = u8::try_from(level)
            .ok()
            .and_then(Layer::new)
            .ok_or_else(|| Error::Internal(format!("invalid stored layer {}", level)))?;

        Ok(Concept {
            id: row.get("id"),
            label: row.get("label"),
            description: row.get("description"),
            layer,
            inherits: row.get("inherits"),
            is_abstract: row.get("is_abstract"),
            synonyms: row.get::<Json<Vec<String>>, _>("synonyms").0,
            mixins: row.get::<Json<Vec<String>>, _>("mixins").0,
            properties: row.get::<Json<Vec<PropertyDef>>, _>("properties").0,
            relationships: row.get::<Json<Vec<Relationship>>, _>("relationships").0,
            extraction_template: row
                .get::<Option<Json<ExtractionTemplate>>, _>("extraction_template")
                .map(|j| j.0),
            pillar: row.get("pillar"),
        })
    }
}

#[async_trait]
impl OntologyRepository for PgOntologyRepository {
    async fn list_concepts(&self) -> Result<Vec<Concept>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM concept ORDER BY seq ASC",
            CONCEPT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_concept_row).collect()
    }

    async fn get_concept(&self, id: &str) -> Result<Option<Concept>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM concept WHERE id = $1",
            CONCEPT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_concept_row).transpose()
    }

    async fn insert_concept(&self, concept: &Concept) -> Result<()> {
        sqlx::query(
            "INSERT INTO concept (id, label, description, layer, inherits, is_abstract, synonyms,
                                  mixins, properties, relationships, extraction_template, pillar)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&concept.id)
        .bind(&concept.label)
        .bind(&concept.description)
        .bind(concept.layer.level() as i16)
        .bind(&concept.inherits)
        .bind(concept.is_abstract)
        .bind(Json(&concept.synonyms))
        .bind(Json(&concept.mixins))
        .bind(Json(&concept.properties))
        .bind(Json(&concept.relationships))
        .bind(concept.extraction_template.as_ref().map(Json))
        .bind(&concept.pillar)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_concept(&self, concept: &Concept) -> Result<()> {
        let result = sqlx::query(
            "UPDATE concept
             SET label = $2, description = $3, layer = $4, inherits = $5, is_abstract = $6,
                 synonyms = $7, mixins = $8, properties = $9, relationships = $10,
                 extraction_template = $11, pillar = $12, updated_at = $13
             WHERE id = $1",
        )
        .bind(&concept.id)
        .bind(&concept.label)
        .bind(&concept.description)
        .bind(concept.layer.level() as i16)
        .bind(&concept.inherits)
        .bind(concept.is_abstract)
        .bind(Json(&concept.synonyms))
        .bind(Json(&concept.mixins))
        .bind(Json(&concept.properties))
        .bind(Json(&concept.relationships))
        .bind(concept.extraction_template.as_ref().map(Json))
        .bind(&concept.pillar)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("concept '{}'", concept.id)));
        }
        Ok(())
    }

    async fn delete_concept(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM concept WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("concept '{}'", id)));
        }
        Ok(())
    }

    async fn count_children(&self, id: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM concept WHERE inherits = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count.0)
    }

    async fn list_mixins(&self) -> Result<Vec<Mixin>> {
        let rows = sqlx::query("SELECT id, properties FROM concept_mixin ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| Mixin {
                id: row.get("id"),
                properties: row.get::<Json<Vec<PropertyDef>>, _>("properties").0,
            })
            .collect())
    }

    async fn upsert_mixin(&self, mixin: &Mixin) -> Result<()> {
        sqlx::query(
            "INSERT INTO concept_mixin (id, properties) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET properties = EXCLUDED.properties",
        )
        .bind(&mixin.id)
        .bind(Json(&mixin.properties))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_embedded_types(&self) -> Result<Vec<EmbeddedType>> {
        let rows = sqlx::query(
            "SELECT id, applies_to, properties, description FROM embedded_type ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| EmbeddedType {
                id: row.get("id"),
                applies_to: row.get::<Json<Vec<String>>, _>("applies_to").0,
                properties: row.get::<Json<Vec<PropertyDef>>, _>("properties").0,
                description: row.get("description"),
            })
            .collect())
    }

    async fn upsert_embedded_type(&self, embedded_type: &EmbeddedType) -> Result<()> {
        sqlx::query(
            "INSERT INTO embedded_type (id, applies_to, properties, description)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE
             SET applies_to = EXCLUDED.applies_to,
                 properties = EXCLUDED.properties,
                 description = EXCLUDED.description",
        )
        .bind(&embedded_type.id)
        .bind(Json(&embedded_type.applies_to))
        .bind(Json(&embedded_type.properties))
        .bind(&embedded_type.description)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
