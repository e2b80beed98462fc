//! PDF合并
//!
//! 每个源文档的对象重新编号到互不重叠的区间，页面按输入顺序挂到一棵新的页面树下。
//! 页面内容流原样保留。

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use mirai_core::{MiraiError, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// 可从父节点继承的页面属性
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// PDF合并器
#[derive(Debug, Clone, Default)]
pub struct DocumentMerger;

impl DocumentMerger {
    pub fn new() -> Self {
        Self
    }

    /// 按顺序合并至少两个PDF，任一源无法解析时整体失败
    pub fn merge(&self, sources: &[&[u8]]) -> Result<Vec<u8>> {
        if sources.len() < 2 {
            return Err(MiraiError::Validation(format!(
                "At least two PDFs are required to merge, got {}",
                sources.len()
            )));
        }

        let mut documents = Vec::with_capacity(sources.len());
        for (index, data) in sources.iter().enumerate() {
            let doc = Document::load_mem(data)
                .map_err(|e| MiraiError::Decode(format!("PDF {} could not be parsed: {}", index + 1, e)))?;
            documents.push(doc);
        }

        let mut next_id = 1;
        let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
        let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

        for (index, mut doc) in documents.into_iter().enumerate() {
            doc.renumber_objects_with(next_id);
            next_id = doc.max_id + 1;

            let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
            debug!("源文档 {} 含 {} 页", index + 1, page_ids.len());

            for page_id in page_ids {
                let page = flatten_page(&doc, page_id).map_err(|e| {
                    MiraiError::Decode(format!("PDF {} has an invalid page tree: {}", index + 1, e))
                })?;
                pages.push((page_id, page));
            }

            for (id, object) in doc.objects {
                if !is_tree_node(&object) {
                    objects.insert(id, object);
                }
            }
        }

        if pages.is_empty() {
            return Err(MiraiError::Decode("Merged document has no pages".to_string()));
        }

        let mut merged = Document::with_version("1.5");
        merged.objects = objects;
        merged.max_id = next_id - 1;

        let pages_id = merged.new_object_id();
        let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
        let count = pages.len() as i64;

        for (id, mut page) in pages {
            page.set("Parent", pages_id);
            merged.objects.insert(id, Object::Dictionary(page));
        }

        merged.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = merged.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        merged.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        merged
            .save_to(&mut buffer)
            .map_err(|e| MiraiError::Internal(format!("Failed to write merged PDF: {}", e)))?;

        info!("已合并 {} 个PDF，共 {} 页", sources.len(), count);
        Ok(buffer)
    }
}

/// 统计PDF页数
pub fn page_count(data: &[u8]) -> Result<usize> {
    let doc = Document::load_mem(data).map_err(|e| MiraiError::Decode(format!("PDF could not be parsed: {}", e)))?;
    Ok(doc.get_pages().len())
}

/// 页面字典副本，缺失的可继承属性从祖先节点补齐
fn flatten_page(doc: &Document, page_id: ObjectId) -> lopdf::Result<Dictionary> {
    let mut page = doc.get_object(page_id)?.as_dict()?.clone();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        // 防止循环引用
        depth += 1;
        if depth > 64 {
            break;
        }
        let node = match doc.get_object(parent_id).and_then(Object::as_dict) {
            Ok(node) => node,
            Err(_) => break,
        };
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key, value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    page.remove(b"Parent");
    Ok(page)
}

/// 旧的目录和页面树节点（页面本身会重新插入）
fn is_tree_node(object: &Object) -> bool {
    match object {
        Object::Dictionary(dict) => matches!(
            dict.get(b"Type").and_then(Object::as_name),
            Ok(b"Catalog") | Ok(b"Pages") | Ok(b"Page")
        ),
        _ => false,
    }
}
