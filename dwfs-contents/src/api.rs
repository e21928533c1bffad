use dwfs_core::{Content, ContentFormat, Dataset, DatasetSummary, DwClient, DwError, User};

/// Remote operations the contents facade depends on.
#[allow(async_fn_in_trait)]
pub trait DatasetApi {
    async fn get_me(&self) -> Result<User, DwError>;

    async fn get_user(&self, user: &str) -> Result<Option<User>, DwError>;

    async fn get_datasets(&self) -> Result<Vec<DatasetSummary>, DwError>;

    async fn get_dataset(&self, owner: &str, dataset_id: &str)
    -> Result<Option<Dataset>, DwError>;

    async fn get_file(
        &self,
        owner: &str,
        dataset_id: &str,
        file_name: &str,
        format: Option<ContentFormat>,
    ) -> Result<Content, DwError>;

    /// Returns the dataset as it looks after the upload.
    async fn upload_file(
        &self,
        owner: &str,
        dataset_id: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<Dataset, DwError>;

    async fn delete_file(&self, owner: &str, dataset_id: &str, file_name: &str)
    -> Result<(), DwError>;

    async fn delete_subdirectory(
        &self,
        owner: &str,
        dataset_id: &str,
        directory_name: &str,
    ) -> Result<(), DwError>;

    async fn delete_dataset(&self, owner: &str, dataset_id: &str) -> Result<(), DwError>;
}

impl DatasetApi for DwClient {
    async fn get_me(&self) -> Result<User, DwError> {
        DwClient::get_me(self).await
    }

    async fn get_user(&self, user: &str) -> Result<Option<User>, DwError> {
        DwClient::get_user(self, user).await
    }

    async fn get_datasets(&self) -> Result<Vec<DatasetSummary>, DwError> {
        DwClient::get_datasets(self).await
    }

    async fn get_dataset(
        &self,
        owner: &str,
        dataset_id: &str,
    ) -> Result<Option<Dataset>, DwError> {
        DwClient::get_dataset(self, owner, dataset_id).await
    }

    async fn get_file(
        &self,
        owner: &str,
        dataset_id: &str,
        file_name: &str,
        format: Option<ContentFormat>,
    ) -> Result<Content, DwError> {
        DwClient::get_file(self, owner, dataset_id, file_name, format).await
    }

    async fn upload_file(
        &self,
        owner: &str,
        dataset_id: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<Dataset, DwError> {
        DwClient::upload_file(self, owner, dataset_id, file_name, data).await
    }

    async fn delete_file(
        &self,
        owner: &str,
        dataset_id: &str,
        file_name: &str,
    ) -> Result<(), DwError> {
        DwClient::delete_file(self, owner, dataset_id, file_name).await
    }

    async fn delete_subdirectory(
        &self,
        owner: &str,
        dataset_id: &str,
        directory_name: &str,
    ) -> Result<(), DwError> {
        DwClient::delete_subdirectory(self, owner, dataset_id, directory_name).await
    }

    async fn delete_dataset(&self, owner: &str, dataset_id: &str) -> Result<(), DwError> {
        DwClient::delete_dataset(self, owner, dataset_id).await
    }
}
