//! `file-manager`: sandboxed browsing, reading and searching under one root

use crate::mcp::protocol::{CallToolParams, CallToolResult, Resource, ResourceContents, Tool};
use crate::mcp::server::{McpServer, ResourceHandler, ToolHandler};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use fancy_regex::Regex;
use serde_json::json;
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

pub const SERVER_NAME: &str = "file-manager";

const MAX_READ_BYTES: u64 = 1024 * 1024;
const MATCHES_PER_FILE: usize = 5;
const MATCH_LINE_CHARS: usize = 100;
const TREE_DEPTH: usize = 3;
const RULE: &str = "==================================================";

const IMPORTANT_FILES: [(&str, &str); 5] = [
    ("README.md", "项目说明文档"),
    ("Cargo.toml", "Rust项目清单"),
    ("requirements.txt", "Python依赖列表"),
    (".env.example", "环境变量示例"),
    (".gitignore", "Git忽略文件配置"),
];

const BINARY_EXTENSIONS: [&str; 10] = [
    "exe", "dll", "so", "dylib", "pdf", "jpg", "png", "gif", "zip", "tar",
];

const LINE_COUNTED_EXTENSIONS: [&str; 9] = ["txt", "md", "py", "js", "json", "yaml", "yml", "rs", "toml"];

/// Outcome of resolving a client-supplied relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Found(PathBuf),
    Missing,
    Denied,
}

/// File system access confined to a canonical root
#[derive(Debug, Clone)]
pub struct FileManager {
    root: PathBuf,
}

impl FileManager {
    #[inline]
    pub fn new(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Invalid root directory: {}", root.display()))?;
        if !root.is_dir() {
            return Err(anyhow!("Root is not a directory: {}", root.display()));
        }
        Ok(Self { root })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `relative` onto the root, refusing anything that escapes it
    /// lexically or through symlinks.
    #[inline]
    pub fn resolve(&self, relative: &str) -> Resolved {
        let mut joined = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => joined.push(part),
                Component::ParentDir => {
                    if !joined.pop() {
                        return Resolved::Denied;
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Resolved::Denied,
            }
        }

        if !joined.starts_with(&self.root) {
            return Resolved::Denied;
        }

        match joined.canonicalize() {
            Ok(real) if real.starts_with(&self.root) => Resolved::Found(real),
            Ok(_) => Resolved::Denied,
            Err(_) => Resolved::Missing,
        }
    }

    fn relative<'a>(&self, base: &Path, path: &'a Path) -> &'a Path {
        path.strip_prefix(base).unwrap_or(path)
    }

    #[inline]
    pub fn list_files(&self, path: &str, pattern: &str, recursive: bool) -> Result<String> {
        let target = match self.resolve(path) {
            Resolved::Found(p) => p,
            Resolved::Denied => return Ok("错误：访问被拒绝（路径超出允许范围）".to_string()),
            Resolved::Missing => return Ok(format!("错误：路径不存在 - {}", path)),
        };
        if !target.is_dir() {
            return Ok(format!("错误：{} 不是目录", path));
        }

        let matcher = glob_to_regex(pattern)?;
        let mut entries = Vec::new();
        collect_entries(&self.root, &target, recursive, &mut entries)?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in entries {
            let Some(name) = entry.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if !matcher.is_match(&name).unwrap_or(false) {
                continue;
            }
            if entry.is_dir() {
                dirs.push(entry);
            } else if entry.is_file() {
                files.push(entry);
            }
        }

        if dirs.is_empty() && files.is_empty() {
            return Ok(format!("在 {} 中没有找到匹配 {} 的文件", path, pattern));
        }

        dirs.sort();
        files.sort();

        let mut result = format!("📂 {} 中的文件:\n\n", path);
        if !dirs.is_empty() {
            result.push_str("目录:\n");
            for dir in &dirs {
                let _ = writeln!(result, "  📁 {}/", self.relative(&target, dir).display());
            }
            result.push('\n');
        }
        if !files.is_empty() {
            result.push_str("文件:\n");
            for file in &files {
                let size = fs::metadata(file).map(|m| m.len()).unwrap_or(0);
                let _ = writeln!(
                    result,
                    "  📄 {} ({})",
                    self.relative(&target, file).display(),
                    format_size(size)
                );
            }
        }
        let _ = write!(result, "\n总计: {} 个目录, {} 个文件", dirs.len(), files.len());

        Ok(result)
    }

    #[inline]
    pub fn read_file(&self, path: &str, encoding: &str, max_lines: i64) -> Result<String> {
        let file = match self.resolve(path) {
            Resolved::Found(p) => p,
            Resolved::Denied => return Ok("错误：访问被拒绝".to_string()),
            Resolved::Missing => return Ok(format!("错误：文件不存在 - {}", path)),
        };
        if file.is_dir() {
            return Ok(format!("错误：{} 是目录，不是文件", path));
        }
        if !matches!(encoding.to_lowercase().as_str(), "utf-8" | "utf8") {
            return Ok(format!("错误：不支持的编码 {}，仅支持 utf-8", encoding));
        }

        let size = fs::metadata(&file)?.len();
        if size > MAX_READ_BYTES {
            return Ok(format!("错误：文件太大（{}），超过1MB限制", format_size(size)));
        }

        let Ok(text) = String::from_utf8(fs::read(&file)?) else {
            return Ok(format!("错误：无法使用编码 {} 读取文件", encoding));
        };

        let content = match usize::try_from(max_lines) {
            Ok(limit) if limit > 0 => {
                let total = text.lines().count();
                let mut lines: Vec<String> = text
                    .lines()
                    .take(limit)
                    .map(|l| l.trim_end().to_string())
                    .collect();
                if total > limit {
                    lines.push(format!("\n... (省略剩余内容，文件共 {} 行)", total));
                }
                lines.join("\n")
            }
            _ => text,
        };

        let mut header = format!("📄 文件: {}\n", path);
        let _ = writeln!(header, "📏 大小: {}", format_size(size));
        let _ = writeln!(header, "🔤 编码: {}", encoding);
        let _ = write!(header, "{}\n\n", RULE);

        Ok(header + &content)
    }

    #[inline]
    pub fn file_info(&self, path: &str) -> Result<String> {
        let target = match self.resolve(path) {
            Resolved::Found(p) => p,
            Resolved::Denied => return Ok("错误：访问被拒绝".to_string()),
            Resolved::Missing => return Ok(format!("错误：路径不存在 - {}", path)),
        };

        let meta = fs::metadata(&target)?;
        let mut info = format!("📊 文件信息: {}\n{}\n\n", path, RULE);

        let kind = if meta.is_dir() { "📁 目录" } else { "📄 文件" };
        let _ = writeln!(info, "类型: {}", kind);
        let _ = writeln!(info, "大小: {}", format_size(meta.len()));

        if let Ok(created) = meta.created() {
            let _ = writeln!(info, "创建时间: {}", format_time(created));
        }
        if let Ok(modified) = meta.modified() {
            let _ = writeln!(info, "修改时间: {}", format_time(modified));
        }
        if let Ok(accessed) = meta.accessed() {
            let _ = writeln!(info, "访问时间: {}", format_time(accessed));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = writeln!(
                info,
                "\n权限: {}",
                filemode(meta.permissions().mode(), meta.is_dir())
            );
        }

        if meta.is_file() {
            let extension = target
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            let shown = if extension.is_empty() {
                "无".to_string()
            } else {
                format!(".{}", extension)
            };
            let _ = writeln!(info, "\n文件扩展名: {}", shown);

            if LINE_COUNTED_EXTENSIONS.contains(&extension.as_str()) {
                if let Ok(text) = fs::read_to_string(&target) {
                    let _ = writeln!(info, "行数: {}", text.lines().count());
                }
            }
        } else if meta.is_dir() {
            let mut file_count = 0;
            let mut dir_count = 0;
            for entry in fs::read_dir(&target)?.flatten() {
                if walk_kind(&self.root, &entry) == Walk::Skip {
                    continue;
                }
                let path = entry.path();
                if path.is_dir() {
                    dir_count += 1;
                } else if path.is_file() {
                    file_count += 1;
                }
            }
            let _ = writeln!(info, "\n包含: {} 个文件, {} 个目录", file_count, dir_count);
        }

        Ok(info)
    }

    #[inline]
    pub fn search_content(
        &self,
        keyword: &str,
        path: &str,
        file_pattern: &str,
        case_sensitive: bool,
    ) -> Result<String> {
        let target = match self.resolve(path) {
            Resolved::Found(p) => p,
            Resolved::Denied => return Ok("错误：访问被拒绝".to_string()),
            Resolved::Missing => return Ok(format!("错误：路径不存在 - {}", path)),
        };

        let needle = if case_sensitive {
            keyword.to_string()
        } else {
            keyword.to_lowercase()
        };

        let mut candidates = Vec::new();
        if target.is_file() {
            candidates.push(target.clone());
        } else {
            let matcher = glob_to_regex(file_pattern)?;
            let mut entries = Vec::new();
            collect_entries(&self.root, &target, true, &mut entries)?;
            candidates.extend(entries.into_iter().filter(|p| {
                p.is_file()
                    && p.file_name()
                        .is_some_and(|n| matcher.is_match(&n.to_string_lossy()).unwrap_or(false))
            }));
            candidates.sort();
        }

        let mut results: Vec<(PathBuf, Vec<(usize, String)>)> = Vec::new();
        for file in candidates {
            let binary = file
                .extension()
                .is_some_and(|e| BINARY_EXTENSIONS.contains(&e.to_string_lossy().to_lowercase().as_str()));
            if binary {
                continue;
            }
            let Ok(text) = fs::read_to_string(&file) else {
                continue;
            };

            let matches: Vec<(usize, String)> = text
                .lines()
                .enumerate()
                .filter(|(_, line)| {
                    if case_sensitive {
                        line.contains(&needle)
                    } else {
                        line.to_lowercase().contains(&needle)
                    }
                })
                .map(|(i, line)| (i + 1, line.trim().to_string()))
                .collect();

            if !matches.is_empty() {
                results.push((file, matches));
            }
        }

        if results.is_empty() {
            return Ok(format!("在 {} 中没有找到包含 '{}' 的文件", path, keyword));
        }

        let mut output = format!("🔍 搜索结果 - 关键词: '{}'\n", keyword);
        let _ = writeln!(output, "📍 搜索路径: {}", path);
        let _ = writeln!(output, "📄 文件模式: {}", file_pattern);
        let _ = writeln!(output, "🔤 区分大小写: {}", if case_sensitive { "是" } else { "否" });
        let _ = writeln!(output, "{}\n", RULE);

        let mut total_matches = 0;
        for (file, matches) in &results {
            let _ = writeln!(
                output,
                "\n📄 {} ({} 处匹配):",
                self.relative(&self.root, file).display(),
                matches.len()
            );
            for (line_num, content) in matches.iter().take(MATCHES_PER_FILE) {
                let cut: String = content.chars().take(MATCH_LINE_CHARS).collect();
                let _ = writeln!(output, "  第 {} 行: {}", line_num, cut);
            }
            if matches.len() > MATCHES_PER_FILE {
                let _ = writeln!(output, "  ... 还有 {} 处匹配", matches.len() - MATCHES_PER_FILE);
            }
            total_matches += matches.len();
        }
        let _ = write!(
            output,
            "\n总计: 在 {} 个文件中找到 {} 处匹配",
            results.len(),
            total_matches
        );

        Ok(output)
    }

    /// Directory tree to `TREE_DEPTH` levels, directories first
    #[inline]
    pub fn tree(&self) -> Result<String> {
        let mut out = String::new();
        render_tree(&self.root, &self.root, "", 0, &mut out)?;
        Ok(format!("项目结构:\n\n{}", out))
    }

    /// Text of a `file:///<relative>` resource
    #[inline]
    pub fn read_resource(&self, uri: &str) -> ResourceContents {
        let relative = uri.strip_prefix("file:///").unwrap_or(uri);
        match self.resolve(relative) {
            Resolved::Denied => ResourceContents::text(uri, "text/plain", "错误：访问被拒绝"),
            Resolved::Missing => ResourceContents::text(
                uri,
                "text/plain",
                format!("错误：无法读取文件 - 文件不存在: {}", relative),
            ),
            Resolved::Found(path) => match fs::read_to_string(&path) {
                Ok(text) => ResourceContents::text(uri, mime_type(relative), text),
                Err(e) => ResourceContents::text(
                    uri,
                    "text/plain",
                    format!("错误：无法读取文件 - {}", e),
                ),
            },
        }
    }

    /// Resources for the well-known project files present under the root
    #[inline]
    pub fn important_files(&self) -> Vec<Resource> {
        IMPORTANT_FILES
            .iter()
            .filter(|(name, _)| self.root.join(name).is_file())
            .map(|(name, description)| {
                Resource::new(&format!("file:///{}", name), name, description, mime_type(name))
            })
            .collect()
    }
}

/// How a directory entry may be walked. Symlinks are followed only when
/// their target stays under `root`, and never recursed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    Descend,
    Leaf,
    Skip,
}

fn walk_kind(root: &Path, entry: &fs::DirEntry) -> Walk {
    let Ok(kind) = entry.file_type() else {
        return Walk::Skip;
    };
    if !kind.is_symlink() {
        return if kind.is_dir() { Walk::Descend } else { Walk::Leaf };
    }
    match entry.path().canonicalize() {
        Ok(real) if real.starts_with(root) => Walk::Leaf,
        _ => Walk::Skip,
    }
}

fn collect_entries(root: &Path, dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries.flatten() {
        let walk = walk_kind(root, &entry);
        if walk == Walk::Skip {
            continue;
        }
        let path = entry.path();
        out.push(path.clone());
        if recursive && walk == Walk::Descend {
            collect_entries(root, &path, true, out)?;
        }
    }
    Ok(())
}

fn render_tree(root: &Path, dir: &Path, prefix: &str, depth: usize, out: &mut String) -> Result<()> {
    if depth >= TREE_DEPTH {
        let _ = writeln!(out, "{}...", prefix);
        return Ok(());
    }

    let mut items: Vec<(PathBuf, Walk)> = fs::read_dir(dir)?
        .flatten()
        .filter_map(|e| match walk_kind(root, &e) {
            Walk::Skip => None,
            walk => Some((e.path(), walk)),
        })
        .collect();
    items.sort_by_key(|(p, _)| (!p.is_dir(), p.file_name().map(|n| n.to_os_string())));

    let count = items.len();
    for (i, (item, walk)) in items.iter().enumerate() {
        let last = i + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
        let name = item
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if item.is_dir() {
            let _ = writeln!(out, "{}{}📁 {}/", prefix, connector, name);
            if depth + 1 < TREE_DEPTH && *walk == Walk::Descend {
                render_tree(root, item, &child_prefix, depth + 1, out)?;
            }
        } else {
            let size = fs::metadata(item).map(|m| m.len()).unwrap_or(0);
            let _ = writeln!(out, "{}{}📄 {} ({})", prefix, connector, name, format_size(size));
        }
    }
    Ok(())
}

/// Translate a shell glob (`*`, `?`, `[...]`, `[!...]`) into an anchored regex
#[inline]
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' {
                        class.push('\\');
                    }
                    class.push(c);
                }
                if closed {
                    regex.push('[');
                    regex.push_str(&class);
                    regex.push(']');
                } else {
                    regex.push_str(&fancy_regex::escape(&format!("[{}", class)));
                }
            }
            other => regex.push_str(&fancy_regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).with_context(|| format!("Invalid file pattern: {}", pattern))
}

/// `x.y B`, `KB`, `MB`, `GB` or `TB`
#[inline]
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

#[inline]
pub fn mime_type(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "md" => "text/markdown",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "toml" => "application/toml",
        "json" => "application/json",
        "yaml" | "yml" => "text/yaml",
        "html" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "ipynb" => "application/x-ipynb+json",
        _ => "text/plain",
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// `ls -l` style permission string
#[inline]
pub fn filemode(mode: u32, is_dir: bool) -> String {
    let mut out = String::with_capacity(10);
    out.push(if is_dir { 'd' } else { '-' });
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileTool {
    ListFiles,
    ReadFile,
    FileInfo,
    SearchContent,
}

impl FileTool {
    const ALL: [Self; 4] = [
        Self::ListFiles,
        Self::ReadFile,
        Self::FileInfo,
        Self::SearchContent,
    ];

    fn definition(self) -> Tool {
        match self {
            Self::ListFiles => Tool::new(
                "list_files",
                "列出目录中的文件和子目录",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "目录路径（相对于基础路径）", "default": "."},
                        "pattern": {"type": "string", "description": "文件匹配模式（如 *.rs, *.md）", "default": "*"},
                        "recursive": {"type": "boolean", "description": "是否递归搜索子目录", "default": false}
                    }
                }),
            ),
            Self::ReadFile => Tool::new(
                "read_file",
                "读取文件内容",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "文件路径（相对于基础路径）"},
                        "encoding": {"type": "string", "description": "文件编码", "default": "utf-8"},
                        "max_lines": {"type": "integer", "description": "最大读取行数（-1表示全部）", "default": -1}
                    },
                    "required": ["path"]
                }),
            ),
            Self::FileInfo => Tool::new(
                "file_info",
                "获取文件或目录的详细信息",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "文件或目录路径"}
                    },
                    "required": ["path"]
                }),
            ),
            Self::SearchContent => Tool::new(
                "search_content",
                "在文件中搜索特定内容",
                json!({
                    "type": "object",
                    "properties": {
                        "keyword": {"type": "string", "description": "要搜索的关键词"},
                        "path": {"type": "string", "description": "搜索路径", "default": "."},
                        "file_pattern": {"type": "string", "description": "文件模式（如 *.rs）", "default": "*"},
                        "case_sensitive": {"type": "boolean", "description": "是否区分大小写", "default": false}
                    },
                    "required": ["keyword"]
                }),
            ),
        }
    }

    fn run(self, files: &FileManager, params: &CallToolParams) -> Result<String> {
        let required = |key: &str| {
            params
                .str_arg(key)
                .ok_or_else(|| anyhow!("缺少参数 '{}'", key))
        };

        match self {
            Self::ListFiles => files.list_files(
                params.str_arg("path").unwrap_or("."),
                params.str_arg("pattern").unwrap_or("*"),
                params.bool_arg("recursive").unwrap_or(false),
            ),
            Self::ReadFile => files.read_file(
                required("path")?,
                params.str_arg("encoding").unwrap_or("utf-8"),
                params.i64_arg("max_lines").unwrap_or(-1),
            ),
            Self::FileInfo => files.file_info(required("path")?),
            Self::SearchContent => files.search_content(
                required("keyword")?,
                params.str_arg("path").unwrap_or("."),
                params.str_arg("file_pattern").unwrap_or("*"),
                params.bool_arg("case_sensitive").unwrap_or(false),
            ),
        }
    }
}

struct FileToolHandler {
    files: Arc<FileManager>,
    tool: FileTool,
}

#[async_trait]
impl ToolHandler for FileToolHandler {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let files = Arc::clone(&self.files);
        let tool = self.tool;
        let outcome = tokio::task::spawn_blocking(move || tool.run(&files, &params)).await?;

        Ok(match outcome {
            Ok(text) if text.starts_with("错误：") => CallToolResult::error(text),
            Ok(text) => CallToolResult::text(text),
            Err(e) => CallToolResult::error(format!("错误：执行工具时出错 - {:#}", e)),
        })
    }
}

struct FileResourceHandler {
    files: Arc<FileManager>,
}

#[async_trait]
impl ResourceHandler for FileResourceHandler {
    async fn handle(&self, uri: &str) -> Result<ResourceContents> {
        Ok(self.files.read_resource(uri))
    }
}

struct TreeResourceHandler {
    files: Arc<FileManager>,
}

#[async_trait]
impl ResourceHandler for TreeResourceHandler {
    async fn handle(&self, uri: &str) -> Result<ResourceContents> {
        let files = Arc::clone(&self.files);
        let tree = tokio::task::spawn_blocking(move || files.tree()).await??;
        Ok(ResourceContents::text(uri, "text/plain", tree))
    }
}

/// Build the file-manager server rooted at `root`
#[inline]
pub async fn build_server(root: &Path) -> Result<Arc<McpServer>> {
    let files = Arc::new(FileManager::new(root)?);
    debug!("File manager root: {}", files.root().display());

    let server = McpServer::new(SERVER_NAME, env!("CARGO_PKG_VERSION"))?
        .with_instructions("Read-only file access confined to the server root");

    for tool in FileTool::ALL {
        server
            .register_tool(
                tool.definition(),
                FileToolHandler {
                    files: Arc::clone(&files),
                    tool,
                },
            )
            .await;
    }

    for resource in files.important_files() {
        server
            .register_resource(
                resource,
                FileResourceHandler {
                    files: Arc::clone(&files),
                },
            )
            .await;
    }
    server
        .register_resource(
            Resource::new("tree:///", "项目结构", "项目的目录树结构", "text/plain"),
            TreeResourceHandler {
                files: Arc::clone(&files),
            },
        )
        .await;
    server
        .register_resource_template(
            "file:///",
            FileResourceHandler {
                files: Arc::clone(&files),
            },
        )
        .await;

    Ok(Arc::new(server))
}
