//! Static template files written by the scaffold.

pub const ENV_EXAMPLE: &str = "# OpenAI 兼容接口
OPENAI_API_KEY=your-openai-api-key-here
OPENAI_BASE_URL=https://api.openai.com/v1
OPENAI_MODEL=gpt-3.5-turbo

# 向量嵌入
OLLAMA_HOST=localhost
OLLAMA_PORT=11434
EMBEDDING_MODEL=nomic-embed-text

# 数据目录
AGENT_LAB_HOME=./data

# 服务端口
RAG_SERVICE_PORT=8001
FILE_SERVICE_PORT=8002
MATH_SERVICE_PORT=8003
";

pub const DOCKER_COMPOSE: &str = "version: '3.8'

services:
  ollama:
    image: ollama/ollama:latest
    ports:
      - \"11434:11434\"
    volumes:
      - ./data/cache:/root/.ollama

  rag-service:
    build: ./mcp_services/rag_service
    env_file: .env
    ports:
      - \"8001:8001\"
    volumes:
      - ./data:/app/data
      - ./logs:/app/logs
    depends_on:
      - ollama

  file-service:
    build: ./mcp_services/file_service
    ports:
      - \"8002:8002\"
    volumes:
      - ./data/uploads:/app/uploads

  math-service:
    build: ./mcp_services/math_service
    ports:
      - \"8003:8003\"
";

pub const REQUIREMENTS: &str = "openai>=1.0.0
langchain>=0.1.0
langchain-openai>=0.0.5
langgraph>=0.0.40
crewai>=0.1.0
chromadb>=0.4.0
mcp>=0.1.0
python-dotenv>=1.0.0
";

/// File name and contents, in write order
pub const FILES: [(&str, &str); 3] = [
    (".env.example", ENV_EXAMPLE),
    ("docker-compose.yml", DOCKER_COMPOSE),
    ("requirements.txt", REQUIREMENTS),
];
