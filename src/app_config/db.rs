use std::env;

use once_cell::sync::OnceCell;
use rbatis::RBatis;
use rbdc_mysql::MysqlDriver;

static DB_CLIENT: OnceCell<RBatis> = OnceCell::new();

/// 初始化数据库连接池，进程启动时调用一次
pub async fn init_db() -> &'static RBatis {
    let rb = RBatis::new();
    rb.link(MysqlDriver {}, &env::var("DB_HOST").expect("DB_HOST config is none"))
        .await
        .expect("Failed to connect db");
    //这里建议 需要调整数据库的最大连接数
    rb.get_pool().unwrap().set_max_open_conns(100).await;

    DB_CLIENT.set(rb).expect("Failed to set DB_CLIENT");
    DB_CLIENT.get().expect("DB_CLIENT is not initialized")
}

pub fn get_db_client() -> &'static RBatis {
    DB_CLIENT.get().expect("DB_CLIENT is not initialized")
}

/// 是否已完成数据库初始化（纸面模式下可不连库）
pub fn db_is_ready() -> bool {
    DB_CLIENT.get().is_some()
}
