//! Structured image-annotation schema sent with every OCR request.
//!
//! The provider detects figures (charts, tables rendered as images, photos,
//! diagrams) and fills in this schema for each one. The relay renders the
//! three fields as a labeled block under the page text.

use crate::config::AnnotationLocale;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Schema name announced to the provider.
pub const SCHEMA_NAME: &str = "ImageAnnotation";

/// One image annotation as returned by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAnnotation {
    #[serde(default)]
    pub image_type: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub summary: String,
}

impl ImageAnnotation {
    /// `true` when the provider filled in none of the fields.
    pub fn is_empty(&self) -> bool {
        self.image_type.trim().is_empty()
            && self.short_description.trim().is_empty()
            && self.summary.trim().is_empty()
    }
}

/// Field descriptions for one locale.
struct SchemaText {
    description: &'static str,
    image_type: &'static str,
    short_description: &'static str,
    summary: &'static str,
}

const PT_BR: SchemaText = SchemaText {
    description: "Anotação detalhada de imagem em português brasileiro",
    image_type: "Tipo da imagem: gráfico, tabela, figura, diagrama, foto, esquema, fluxograma, etc.",
    short_description: "Descrição curta e objetiva da imagem em português (máximo 100 caracteres)",
    summary: "Resumo detalhado do conteúdo visual, dados, texto e elementos importantes da imagem em português",
};

const EN: SchemaText = SchemaText {
    description: "Detailed image annotation in English",
    image_type: "Image type: chart, table, figure, diagram, photo, schematic, flowchart, etc.",
    short_description: "Short, objective description of the image in English (100 characters max)",
    summary: "Detailed summary of the visual content, data, text and important elements of the image in English",
};

fn schema_text(locale: AnnotationLocale) -> &'static SchemaText {
    match locale {
        AnnotationLocale::PtBr => &PT_BR,
        AnnotationLocale::En => &EN,
    }
}

/// Build the `bbox_annotation_format` value for the OCR request.
pub fn annotation_format(locale: AnnotationLocale) -> Value {
    let text = schema_text(locale);
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": SCHEMA_NAME,
            "description": text.description,
            "schema": {
                "type": "object",
                "properties": {
                    "image_type": { "type": "string", "description": text.image_type },
                    "short_description": { "type": "string", "description": text.short_description },
                    "summary": { "type": "string", "description": text.summary }
                },
                "required": ["image_type", "short_description", "summary"],
                "additionalProperties": false
            },
            "strict": false
        }
    })
}

/// Labels used when rendering an annotation block.
pub fn labels(locale: AnnotationLocale) -> (&'static str, &'static str, &'static str, &'static str) {
    match locale {
        AnnotationLocale::PtBr => ("Imagem", "Tipo", "Descrição", "Resumo"),
        AnnotationLocale::En => ("Image", "Type", "Description", "Summary"),
    }
}
