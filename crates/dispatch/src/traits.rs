use async_trait::async_trait;
use domain::Error;

/// 发送成功后平台返回的凭据
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// 以 sender 账号向 recipient 私信。实现方负责节流；
    /// 平台报错和网络故障一律折叠成 Error::Delivery，调用方不重试。
    async fn send(
        &self,
        sender_ig_user_id: &str,
        recipient_id: &str,
        text: &str,
        access_token: &str,
    ) -> Result<Delivery, Error>;

    /// 为页面订阅 comments 回调。尽力而为：调用方失败只记日志，不中断主流程。
    async fn ensure_subscription(&self, page_id: &str, access_token: &str) -> Result<(), Error>;
}
