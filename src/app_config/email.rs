use std::env;
use std::time::Duration;

use lettre::message::header;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info};

/// 邮件发送配置
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP 超时时间（秒）
    pub smtp_timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_timeout_secs: 10,
        }
    }
}

/// 发送通知邮件 - 非阻塞，在独立阻塞任务中执行
pub async fn send_email(title: &str, body: String) {
    send_email_with_config(title, body, EmailConfig::default()).await;
}

pub async fn send_email_with_config(title: &str, body: String, config: EmailConfig) {
    let title = title.to_string();

    let result =
        tokio::task::spawn_blocking(move || send_email_blocking(&title, body, config)).await;

    match result {
        Ok(Ok(())) => {
            info!("email sent: ok");
        }
        Ok(Err(e)) => {
            error!("could not send email: {:?}", e);
        }
        Err(e) => {
            error!("email task panicked: {:?}", e);
        }
    }
}

/// 同步阻塞的邮件发送实现（在独立线程中运行）
fn send_email_blocking(
    title: &str,
    body: String,
    config: EmailConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let smtp_server =
        env::var("EMAIL_SMTP_SERVER").unwrap_or_else(|_| "smtp.gmail.com".to_string());
    let smtp_port = env::var("EMAIL_SMTP_PORT").unwrap_or_else(|_| "587".to_string());

    // 发件人和收件人
    let from = env::var("EMAIL_FROM").unwrap_or_else(|_| "xxxxxxxx@gmail.com".to_string());
    let to = env::var("EMAIL_TO").unwrap_or_else(|_| "xxxxxx@163.com".to_string());

    // 发件人邮箱的凭证
    let username =
        env::var("EMAIL_SEND_USERNAME").unwrap_or_else(|_| "xxxxxxxx@gmail.com".to_string());
    let password = env::var("EMAIL_SEND_PASSWORD").unwrap_or_else(|_| "xxxxxx".to_string());

    let email = Message::builder()
        .from(from.parse()?)
        .to(to.parse()?)
        .subject(title)
        .header(header::ContentType::TEXT_PLAIN)
        .body(body)?;

    let creds = Credentials::new(username, password);

    let mailer = SmtpTransport::starttls_relay(&smtp_server)?
        .port(smtp_port.parse()?)
        .credentials(creds)
        .timeout(Some(Duration::from_secs(config.smtp_timeout_secs)))
        .build();

    mailer.send(&email)?;

    Ok(())
}
