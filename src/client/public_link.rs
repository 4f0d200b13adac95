use uuid::Uuid;

use super::{ClientError, PublicLinkApi};
use crate::messages;
use crate::models::PublicLinkResponse;

/// ノート詳細の「公開リンク」パネル
///
/// 再生成は確認ステップを挟む: `request_rotate` で確認を開き、
/// `confirm_rotate` で実行、`cancel_rotate` で閉じる。
pub struct PublicLinkPanel<A> {
    api: A,
    note_id: Uuid,
    link: Option<PublicLinkResponse>,
    confirming_rotate: bool,
    error: Option<String>,
}

impl<A: PublicLinkApi> PublicLinkPanel<A> {
    pub fn new(api: A, note_id: Uuid, link: Option<PublicLinkResponse>) -> Self {
        Self {
            api,
            note_id,
            link,
            confirming_rotate: false,
            error: None,
        }
    }

    pub fn link(&self) -> Option<&PublicLinkResponse> {
        self.link.as_ref()
    }

    /// 有効なときだけ共有 URL を返す
    pub fn share_url(&self) -> Option<&str> {
        self.link
            .as_ref()
            .filter(|link| link.is_enabled)
            .map(|link| link.url.as_str())
    }

    pub fn is_confirming_rotate(&self) -> bool {
        self.confirming_rotate
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn track<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        match &result {
            Ok(_) => self.error = None,
            Err(err) => self.error = Some(err.user_message()),
        }
        result
    }

    pub async fn load(&mut self) -> Result<(), ClientError> {
        let result = self.api.get_link(self.note_id).await;
        let link = self.track(result)?;
        self.link = link;
        Ok(())
    }

    /// 未作成なら作成、無効なら同じトークンで再有効化
    pub async fn enable(&mut self) -> Result<&PublicLinkResponse, ClientError> {
        let result = self.api.enable_link(self.note_id).await;
        let link = self.track(result)?;
        Ok(self.link.insert(link))
    }

    pub async fn disable(&mut self) -> Result<(), ClientError> {
        if self.link.is_none() {
            return Ok(());
        }
        let result = self.api.set_link_enabled(self.note_id, false).await;
        let link = self.track(result)?;
        self.link = Some(link);
        Ok(())
    }

    pub async fn toggle(&mut self) -> Result<(), ClientError> {
        let enabled = self.link.as_ref().is_some_and(|link| link.is_enabled);
        if enabled {
            self.disable().await
        } else {
            self.enable().await.map(|_| ())
        }
    }

    /// リンクが存在するときだけ確認を開く
    pub fn request_rotate(&mut self) -> bool {
        self.confirming_rotate = self.link.is_some();
        self.confirming_rotate
    }

    pub fn cancel_rotate(&mut self) {
        self.confirming_rotate = false;
    }

    /// 新しいトークンを割り当てる。以前の共有 URL は無効になる。
    pub async fn confirm_rotate(&mut self) -> Result<&PublicLinkResponse, ClientError> {
        if !self.confirming_rotate {
            return Err(ClientError::Invalid(
                messages::ROTATE_NOT_CONFIRMED.to_string(),
            ));
        }
        self.confirming_rotate = false;

        let result = self.api.rotate_link(self.note_id).await;
        let link = self.track(result)?;
        Ok(self.link.insert(link))
    }

    pub async fn remove(&mut self) -> Result<(), ClientError> {
        let result = self.api.delete_link(self.note_id).await;
        self.track(result)?;
        self.link = None;
        self.confirming_rotate = false;
        Ok(())
    }
}
